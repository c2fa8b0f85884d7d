use super::error::VmError;

/// Bytecode operations for the kiln VM.
///
/// Each opcode is a single byte. Operands, when present, follow inline:
/// - `u8` constant-pool or stack-slot index
/// - `u16` big-endian jump offset (`Jump`, `JumpIfFalse`, `Loop`)
/// - `Closure` is followed by one `(is_local, index)` byte pair per upvalue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    // ========================================
    // Constants and literals
    // ========================================
    Constant,
    Nil,
    True,
    False,
    Pop,

    // ========================================
    // Variables
    // ========================================
    GetLocal,
    SetLocal,
    GetGlobal,
    DefineGlobal,
    SetGlobal,
    GetUpvalue,
    SetUpvalue,
    GetProperty,
    SetProperty,
    GetSuper,

    // ========================================
    // Comparison and arithmetic
    // ========================================
    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    Print,

    // ========================================
    // Control flow
    // ========================================
    Jump,
    JumpIfFalse,
    Loop,
    Call,
    Invoke,
    SuperInvoke,
    Closure,
    CloseUpvalue,
    Return,

    // ========================================
    // Classes and enums
    // ========================================
    Class,
    Inherit,
    Method,
    Enum,
    SetEnumValue,

    // ========================================
    // Collections
    // ========================================
    NewList,
    AddList,
    UnpackList,
    Subscript,
    SubscriptAssign,
    SubscriptPush,
    NewDict,
}

impl OpCode {
    const ALL: [OpCode; 46] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::GetUpvalue,
        OpCode::SetUpvalue,
        OpCode::GetProperty,
        OpCode::SetProperty,
        OpCode::GetSuper,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Call,
        OpCode::Invoke,
        OpCode::SuperInvoke,
        OpCode::Closure,
        OpCode::CloseUpvalue,
        OpCode::Return,
        OpCode::Class,
        OpCode::Inherit,
        OpCode::Method,
        OpCode::Enum,
        OpCode::SetEnumValue,
        OpCode::NewList,
        OpCode::AddList,
        OpCode::UnpackList,
        OpCode::Subscript,
        OpCode::SubscriptAssign,
        OpCode::SubscriptPush,
        OpCode::NewDict,
    ];

    /// Get the opcode name for tracing.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Constant => "OP_CONSTANT",
            OpCode::Nil => "OP_NIL",
            OpCode::True => "OP_TRUE",
            OpCode::False => "OP_FALSE",
            OpCode::Pop => "OP_POP",
            OpCode::GetLocal => "OP_GET_LOCAL",
            OpCode::SetLocal => "OP_SET_LOCAL",
            OpCode::GetGlobal => "OP_GET_GLOBAL",
            OpCode::DefineGlobal => "OP_DEFINE_GLOBAL",
            OpCode::SetGlobal => "OP_SET_GLOBAL",
            OpCode::GetUpvalue => "OP_GET_UPVALUE",
            OpCode::SetUpvalue => "OP_SET_UPVALUE",
            OpCode::GetProperty => "OP_GET_PROPERTY",
            OpCode::SetProperty => "OP_SET_PROPERTY",
            OpCode::GetSuper => "OP_GET_SUPER",
            OpCode::Equal => "OP_EQUAL",
            OpCode::Greater => "OP_GREATER",
            OpCode::Less => "OP_LESS",
            OpCode::Add => "OP_ADD",
            OpCode::Subtract => "OP_SUBTRACT",
            OpCode::Multiply => "OP_MULTIPLY",
            OpCode::Divide => "OP_DIVIDE",
            OpCode::Not => "OP_NOT",
            OpCode::Negate => "OP_NEGATE",
            OpCode::Print => "OP_PRINT",
            OpCode::Jump => "OP_JUMP",
            OpCode::JumpIfFalse => "OP_JUMP_IF_FALSE",
            OpCode::Loop => "OP_LOOP",
            OpCode::Call => "OP_CALL",
            OpCode::Invoke => "OP_INVOKE",
            OpCode::SuperInvoke => "OP_SUPER_INVOKE",
            OpCode::Closure => "OP_CLOSURE",
            OpCode::CloseUpvalue => "OP_CLOSE_UPVALUE",
            OpCode::Return => "OP_RETURN",
            OpCode::Class => "OP_CLASS",
            OpCode::Inherit => "OP_INHERIT",
            OpCode::Method => "OP_METHOD",
            OpCode::Enum => "OP_ENUM",
            OpCode::SetEnumValue => "OP_SET_ENUM_VALUE",
            OpCode::NewList => "OP_NEW_LIST",
            OpCode::AddList => "OP_ADD_LIST",
            OpCode::UnpackList => "OP_UNPACK_LIST",
            OpCode::Subscript => "OP_SUBSCRIPT",
            OpCode::SubscriptAssign => "OP_SUBSCRIPT_ASSIGN",
            OpCode::SubscriptPush => "OP_SUBSCRIPT_PUSH",
            OpCode::NewDict => "OP_NEW_DICT",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = VmError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::ALL
            .get(byte as usize)
            .copied()
            .ok_or(VmError::InvalidOpcode(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_matches_discriminant() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::try_from(op as u8), Ok(op));
        }
    }

    #[test]
    fn test_wire_numbering() {
        assert_eq!(OpCode::Constant as u8, 0);
        assert_eq!(OpCode::Return as u8, 33);
        assert_eq!(OpCode::NewDict as u8, 45);
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(OpCode::try_from(46), Err(VmError::InvalidOpcode(46)));
        assert_eq!(OpCode::try_from(0xff), Err(VmError::InvalidOpcode(0xff)));
    }
}
