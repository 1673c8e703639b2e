use godot_interop::config::LayoutConfig;
use godot_interop::core::error::LayoutError;
use godot_interop::layout::{self, check_type, host_layouts, BuildConfiguration, LayoutMetadata};
use godot_interop::sim;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_metadata(metadata: &LayoutMetadata) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(metadata.to_json_string().unwrap().as_bytes()).unwrap();
    file
}

#[test]
fn test_bundled_tables_cover_every_configuration() {
    let metadata = LayoutMetadata::bundled().unwrap();
    assert_eq!(metadata.configurations().collect::<Vec<_>>(), BuildConfiguration::ALL);
    for configuration in BuildConfiguration::ALL {
        let table = metadata.configuration(configuration).unwrap();
        let expected_variant = if configuration.is_double() { 40 } else { 24 };
        assert_eq!(table.size_of("Variant"), Some(expected_variant), "{configuration}");
        assert_eq!(table.size_of("Object"), Some(configuration.pointer_size()));
    }
}

#[test]
fn test_engine_metadata_passes() {
    let report = layout::validate(&sim::layout_metadata()).unwrap();
    assert_eq!(report.configuration, BuildConfiguration::active());
    assert_eq!(report.types_checked, host_layouts().len());
    assert!(report.members_checked > 0);
}

#[test]
fn test_configured_metadata_file() {
    let file = write_metadata(&sim::layout_metadata());
    let config = LayoutConfig {
        validate_on_startup: true,
        metadata_path: Some(file.path().to_path_buf()),
    };
    assert!(config.validate().is_ok());
    assert!(layout::validate_configured(&config).is_ok());

    let bundled = LayoutConfig::default();
    assert!(layout::validate_configured(&bundled).is_ok());
}

#[test]
fn test_size_mismatch_is_fatal() {
    let configuration = BuildConfiguration::active();
    let mut metadata = sim::layout_metadata();
    let mut table = metadata.configuration(configuration).unwrap().clone();
    table.sizes.insert("Color".to_string(), 32);
    metadata.insert(configuration, table);

    let file = write_metadata(&metadata);
    let config = LayoutConfig {
        validate_on_startup: true,
        metadata_path: Some(file.path().to_path_buf()),
    };
    assert_eq!(
        layout::validate_configured(&config).unwrap_err(),
        LayoutError::SizeMismatch {
            type_name: "Color".into(),
            expected: 32,
            actual: 16
        }
    );
}

#[test]
fn test_renamed_member_is_unknown() {
    let configuration = BuildConfiguration::active();
    let mut table = sim::layout_metadata().configuration(configuration).unwrap().clone();
    table.members.get_mut("Vector3").unwrap()[2].member = "depth".into();
    let vector3 = host_layouts().into_iter().find(|h| h.name == "Vector3").unwrap();
    assert_eq!(
        check_type(&vector3, &table, configuration),
        Err(LayoutError::UnknownMember {
            type_name: "Vector3".into(),
            member: "depth".into()
        })
    );
}

#[test]
fn test_missing_type_and_configuration() {
    let configuration = BuildConfiguration::active();
    let mut table = sim::layout_metadata().configuration(configuration).unwrap().clone();
    table.sizes.remove("Rect2i");
    assert!(matches!(
        layout::check_layouts(&table, configuration),
        Err(LayoutError::MissingType { ref type_name, .. }) if type_name == "Rect2i"
    ));

    assert!(matches!(
        layout::validate(&LayoutMetadata::new()),
        Err(LayoutError::MissingConfiguration(_))
    ));
}

#[test]
fn test_unreadable_metadata() {
    assert!(matches!(
        LayoutMetadata::from_json_str("{ not json"),
        Err(LayoutError::Parse(_))
    ));
    assert!(matches!(
        LayoutMetadata::from_file("/nonexistent/extension_api.json"),
        Err(LayoutError::Parse(_))
    ));

    // Unknown configurations are skipped, not rejected.
    let metadata = LayoutMetadata::from_json_str(
        r#"{"builtin_class_sizes": [{"build_configuration": "quad_128", "sizes": []}]}"#,
    )
    .unwrap();
    assert_eq!(metadata.configurations().count(), 0);
}
