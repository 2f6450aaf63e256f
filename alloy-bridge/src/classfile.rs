//! A minimal, focused class-file-like container format.
//!
//! Real JVM class files require a full constant-pool-aware parser; nothing
//! in the surrounding ecosystem brings that in, so per the "bytecode
//! transformation" design note this module implements a small stand-in
//! format with the same shape: named methods, each holding a linear
//! instruction list, parsed from and reassembled back to bytes. The
//! transformer in [`crate::transformer`] operates purely in terms of this
//! model; nothing outside this module cares about the byte layout.

use custom_error::custom_error;

const MAGIC: &[u8; 4] = b"ALCF";

custom_error! {pub ClassFileError
    BadMagic = "not an Alloy class-file container",
    Truncated { class: String } = "truncated class-file container for '{class}'",
    Utf8 { class: String } = "non-UTF-8 string in class-file container for '{class}'",
    UnknownOpcode { class: String, opcode: u8 } = "unknown opcode {opcode} in '{class}'",
}

/// One instruction in a method body. This is not a JVM opcode set; it is
/// just expressive enough to model the injections the transformer performs
/// (a static call, plus the two conditional-return shapes the cancellation
/// policies need) alongside opaque passthrough instructions copied
/// unchanged from the original bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// An opaque instruction copied verbatim; `payload` is whatever bytes
    /// followed the opcode tag in the source.
    Opaque { opcode: u8, payload: Vec<u8> },
    /// `invokestatic bridge_class.bridge_method(descriptor)`.
    InvokeBridge {
        bridge_class: String,
        bridge_method: String,
        descriptor: String,
    },
    /// If the value on top of the stack is a truthy boolean, return the
    /// surrounding method's zero value immediately.
    IfTrueReturnDefault,
    /// If the value on top of the stack is non-null, return it immediately.
    IfNonNullReturnValue,
}

const OP_INVOKE_BRIDGE: u8 = 0xF0;
const OP_IF_TRUE_RETURN_DEFAULT: u8 = 0xF1;
const OP_IF_NON_NULL_RETURN_VALUE: u8 = 0xF2;

#[derive(Debug, Clone)]
pub struct MethodBody {
    pub name: String,
    pub descriptor: String,
    /// Set once any [`TransformationSite`](crate::transformer::TransformationSite)
    /// has injected into this method. Re-transforming skips methods with
    /// this flag set, which is what makes the transformer idempotent.
    pub transformed: bool,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub name: String,
    pub methods: Vec<MethodBody>,
}

impl ClassFile {
    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodBody> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassFileError> {
        let mut cursor = Cursor::new(bytes);
        if cursor.take(4).ok_or(ClassFileError::BadMagic)? != MAGIC.as_slice() {
            return Err(ClassFileError::BadMagic);
        }
        let class_name = read_string(&mut cursor, "<unknown>")?;
        let method_count = cursor
            .read_u16()
            .ok_or_else(|| ClassFileError::Truncated { class: class_name.clone() })?;

        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let name = read_string(&mut cursor, &class_name)?;
            let descriptor = read_string(&mut cursor, &class_name)?;
            let transformed = cursor
                .read_u8()
                .ok_or_else(|| ClassFileError::Truncated { class: class_name.clone() })?
                != 0;
            let instruction_count = cursor
                .read_u16()
                .ok_or_else(|| ClassFileError::Truncated { class: class_name.clone() })?;
            let mut instructions = Vec::with_capacity(instruction_count as usize);
            for _ in 0..instruction_count {
                instructions.push(read_instruction(&mut cursor, &class_name)?);
            }
            methods.push(MethodBody {
                name,
                descriptor,
                transformed,
                instructions,
            });
        }

        Ok(ClassFile {
            name: class_name,
            methods,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        write_string(&mut out, &self.name);
        write_u16(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            write_string(&mut out, &method.name);
            write_string(&mut out, &method.descriptor);
            out.push(u8::from(method.transformed));
            write_u16(&mut out, method.instructions.len() as u16);
            for instruction in &method.instructions {
                write_instruction(&mut out, instruction);
            }
        }
        out
    }
}

fn read_instruction(cursor: &mut Cursor, class: &str) -> Result<Instruction, ClassFileError> {
    let opcode = cursor
        .read_u8()
        .ok_or_else(|| ClassFileError::Truncated { class: class.to_string() })?;
    match opcode {
        OP_INVOKE_BRIDGE => Ok(Instruction::InvokeBridge {
            bridge_class: read_string(cursor, class)?,
            bridge_method: read_string(cursor, class)?,
            descriptor: read_string(cursor, class)?,
        }),
        OP_IF_TRUE_RETURN_DEFAULT => Ok(Instruction::IfTrueReturnDefault),
        OP_IF_NON_NULL_RETURN_VALUE => Ok(Instruction::IfNonNullReturnValue),
        op if op < OP_INVOKE_BRIDGE => {
            let len = cursor
                .read_u16()
                .ok_or_else(|| ClassFileError::Truncated { class: class.to_string() })?;
            let payload = cursor
                .take(len as usize)
                .ok_or_else(|| ClassFileError::Truncated { class: class.to_string() })?
                .to_vec();
            Ok(Instruction::Opaque { opcode: op, payload })
        }
        other => Err(ClassFileError::UnknownOpcode {
            class: class.to_string(),
            opcode: other,
        }),
    }
}

fn write_instruction(out: &mut Vec<u8>, instruction: &Instruction) {
    match instruction {
        Instruction::Opaque { opcode, payload } => {
            out.push(*opcode);
            write_u16(out, payload.len() as u16);
            out.extend_from_slice(payload);
        }
        Instruction::InvokeBridge {
            bridge_class,
            bridge_method,
            descriptor,
        } => {
            out.push(OP_INVOKE_BRIDGE);
            write_string(out, bridge_class);
            write_string(out, bridge_method);
            write_string(out, descriptor);
        }
        Instruction::IfTrueReturnDefault => out.push(OP_IF_TRUE_RETURN_DEFAULT),
        Instruction::IfNonNullReturnValue => out.push(OP_IF_NON_NULL_RETURN_VALUE),
    }
}

fn read_string(cursor: &mut Cursor, class: &str) -> Result<String, ClassFileError> {
    let len = cursor
        .read_u16()
        .ok_or_else(|| ClassFileError::Truncated { class: class.to_string() })?;
    let bytes = cursor
        .take(len as usize)
        .ok_or_else(|| ClassFileError::Truncated { class: class.to_string() })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ClassFileError::Utf8 { class: class.to_string() })
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_u16(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_be_bytes([b[0], b[1]]))
    }
}
