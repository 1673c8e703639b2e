use super::{ElementType, VariantArray};
use crate::convert::{FromVariant, ToVariant, VariantType};
use crate::core::error::{ContainerError, ContainerResult, ConversionError, ConversionResult};
use crate::registry::PropertyHint;
use crate::variant::{GType, Variant};
use std::fmt;
use std::marker::PhantomData;

/// Array whose element constraint is fixed by `T` and enforced by the engine.
pub struct TypedArray<T> {
    array: VariantArray,
    _marker: PhantomData<fn() -> T>,
}

impl<T: VariantType> TypedArray<T> {
    pub fn new() -> Self {
        Self {
            array: VariantArray::new_typed(&ElementType::of::<T>()),
            _marker: PhantomData,
        }
    }

    /// Adopts an engine array.
    ///
    /// An array already typed as `T` is shared as is; any other array is copied element by
    /// element into a fresh typed array, failing at the first element `T` does not accept.
    pub fn try_from_array(array: VariantArray) -> ContainerResult<Self> {
        let expected = ElementType::of::<T>();
        let found = array.element_type();
        if found == expected {
            return Ok(Self {
                array,
                _marker: PhantomData,
            });
        }
        if found.is_typed() && expected.is_typed() && found.gtype() != expected.gtype() {
            return Err(ContainerError::ContainerTypeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        array.validate_elements(&expected)?;
        let mut typed = Self::new();
        for value in array.iter() {
            typed.array.push(&value);
        }
        Ok(typed)
    }

    pub fn element_type() -> ElementType {
        ElementType::of::<T>()
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn as_untyped(&self) -> &VariantArray {
        &self.array
    }

    pub fn into_untyped(self) -> VariantArray {
        self.array
    }

    pub fn clear(&mut self) {
        self.array.clear();
    }
}

impl<T: VariantType + ToVariant> TypedArray<T> {
    pub fn push(&mut self, value: &T) {
        self.array.push(&value.to_variant());
    }

    pub fn set(&mut self, index: usize, value: &T) -> ContainerResult<()> {
        self.array.set(index, &value.to_variant())
    }
}

impl<T: VariantType + FromVariant> TypedArray<T> {
    /// Element at `index`, or `None` past the end.
    ///
    /// A stored value `T` cannot represent (a nil in an object array) yields an error
    /// instead of being hidden.
    pub fn get(&self, index: usize) -> Option<ConversionResult<T>> {
        self.array
            .get(index)
            .map(|value| T::from_variant(&value).map_err(|err| ConversionError::element(index, err)))
    }

    /// Yields one result per stored element, so the count always matches [`len`](Self::len).
    pub fn iter(&self) -> impl Iterator<Item = ConversionResult<T>> + '_ {
        self.array
            .iter()
            .enumerate()
            .map(|(index, value)| T::from_variant(&value).map_err(|err| ConversionError::element(index, err)))
    }

    /// Converts every element, failing at the first one `T` cannot represent.
    pub fn to_vec(&self) -> ConversionResult<Vec<T>> {
        self.iter().collect()
    }
}

impl<T: VariantType> Default for TypedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypedArray<T> {
    fn clone(&self) -> Self {
        Self {
            array: self.array.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: VariantType> fmt::Debug for TypedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypedArray<{}>{:?}", ElementType::of::<T>(), self.array)
    }
}

impl<T: VariantType + ToVariant> FromIterator<T> for TypedArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut array = Self::new();
        for value in iter {
            array.push(&value);
        }
        array
    }
}

impl<T> ToVariant for TypedArray<T> {
    fn to_variant(&self) -> Variant {
        self.array.to_variant()
    }
}

impl<T: VariantType> FromVariant for TypedArray<T> {
    fn from_variant(variant: &Variant) -> ConversionResult<Self> {
        let array = VariantArray::from_variant(variant)?;
        Self::try_from_array(array).map_err(container_to_conversion)
    }
}

pub(crate) fn container_to_conversion(err: ContainerError) -> ConversionError {
    match err {
        ContainerError::ContainerTypeMismatch { expected, found } => {
            ConversionError::TypedContainerMismatch { expected, found }
        }
        ContainerError::ElementTypeMismatch {
            index,
            expected,
            found,
        } => ConversionError::element(
            index,
            ConversionError::TypedContainerMismatch { expected, found },
        ),
        other => ConversionError::Custom(other.to_string()),
    }
}

impl<T: VariantType> VariantType for TypedArray<T> {
    const GTYPE: GType = GType::Array;

    fn property_hint() -> (PropertyHint, String) {
        (PropertyHint::ArrayType, ElementType::of::<T>().to_string())
    }
}
