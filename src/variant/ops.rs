/// `GDExtensionVariantOperator`
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantOperator {
    Equal = 0,
    NotEqual = 1,
    Less = 2,
    LessEqual = 3,
    Greater = 4,
    GreaterEqual = 5,
    Add = 6,
    Subtract = 7,
    Multiply = 8,
    Divide = 9,
    Negate = 10,
    Positive = 11,
    Module = 12,
    Power = 13,
    ShiftLeft = 14,
    ShiftRight = 15,
    BitAnd = 16,
    BitOr = 17,
    BitXor = 18,
    BitNegate = 19,
    And = 20,
    Or = 21,
    Xor = 22,
    Not = 23,
    In = 24,
}

impl VariantOperator {
    pub fn to_sys(self) -> u32 {
        self as u32
    }

    pub fn from_sys(raw: u32) -> Option<Self> {
        use VariantOperator::*;
        const ALL: [VariantOperator; 25] = [
            Equal, NotEqual, Less, LessEqual, Greater, GreaterEqual, Add, Subtract, Multiply,
            Divide, Negate, Positive, Module, Power, ShiftLeft, ShiftRight, BitAnd, BitOr, BitXor,
            BitNegate, And, Or, Xor, Not, In,
        ];
        ALL.get(raw as usize).copied()
    }
}
