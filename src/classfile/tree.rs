//! In-memory model of one decoded class file.
//!
//! The tree owns a copy of the original bytes. Declarations expose only what
//! token replacement needs: names for reporting, and every constant that can
//! carry a string.

use super::pool::{ConstantPool, MethodHandle};

/// How a string site is referenced from the class file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    /// One-byte `ldc` operand naming a `CONSTANT_String`.
    NarrowString,
    /// Two-byte index naming a `CONSTANT_String` (`ldc_w`, `ConstantValue`,
    /// bootstrap arguments).
    WideString,
    /// Two-byte index naming a `CONSTANT_Utf8` directly (annotation `s` values).
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot {
    pub(crate) kind: SlotKind,
    /// Absolute file offset of the index operand.
    pub(crate) position: usize,
    /// Constant pool index found at `position` in the input.
    pub(crate) index: u16,
}

/// A mutable string constant at one location in the class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringSite {
    pub value: String,
    original: String,
    pub(crate) slot: Slot,
}

impl StringSite {
    pub(crate) fn new(value: String, slot: Slot) -> Self {
        Self {
            original: value.clone(),
            value,
            slot,
        }
    }

    /// The text this site held when the class was decoded.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_modified(&self) -> bool {
        self.value != self.original
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    String(StringSite),
    /// A string whose payload is not Unicode text (an unpaired surrogate).
    /// It is kept as-is and never rewritten.
    OpaqueString,
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    /// Internal name of a class constant.
    Class(String),
    MethodType(String),
    MethodHandle(MethodHandle),
    Dynamic {
        name: String,
        descriptor: String,
    },
}

impl Constant {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::String(site) => Some(&site.value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `ldc`, `ldc_w` or `ldc2_w`.
    LoadConstant {
        offset: u32,
        opcode: u8,
        constant: Constant,
    },
    /// `invokedynamic`, with its bootstrap method and arguments resolved.
    InvokeDynamic {
        offset: u32,
        name: String,
        descriptor: String,
        bootstrap: MethodHandle,
        arguments: Vec<Constant>,
    },
    Other {
        offset: u32,
        opcode: u8,
    },
}

impl Instruction {
    /// Bytecode offset within the method's code array.
    pub fn offset(&self) -> u32 {
        match self {
            Instruction::LoadConstant { offset, .. }
            | Instruction::InvokeDynamic { offset, .. }
            | Instruction::Other { offset, .. } => *offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub elements: Vec<ElementPair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementPair {
    pub name: String,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Tag `s`.
    String(StringSite),
    /// Tag `s` whose payload is not Unicode text.
    OpaqueString,
    /// Tags `B C D F I J S Z`; `value` is the referenced numeric constant.
    Scalar { tag: u8, value: Constant },
    Enum {
        type_descriptor: String,
        name: String,
    },
    /// Tag `c`: a return descriptor such as `Ljava/lang/String;`.
    Class(String),
    Array(Vec<ElementValue>),
    Annotation(Annotation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Value of the `ConstantValue` attribute, if any.
    pub constant: Option<Constant>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub instructions: Vec<Instruction>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    pub visible_parameter_annotations: Vec<Vec<Annotation>>,
    pub invisible_parameter_annotations: Vec<Vec<Annotation>>,
    pub annotation_default: Option<ElementValue>,
}

/// Original bytes plus the decoded pool, kept for re-encoding.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    pub(crate) bytes: Vec<u8>,
    pub(crate) pool: ConstantPool,
    /// Every bootstrap argument slot that names a `CONSTANT_String`,
    /// whether or not an instruction exposes it as a site.
    pub(crate) string_arguments: Vec<Slot>,
}

#[derive(Debug, Clone)]
pub struct ClassTree {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    /// Internal name, e.g. `com/example/App`.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub visible_annotations: Vec<Annotation>,
    pub invisible_annotations: Vec<Annotation>,
    pub(crate) source: Source,
}

impl ClassTree {
    /// Calls `f` for every string site in the tree, in no particular order.
    pub(crate) fn for_each_site<'a>(&'a self, f: &mut impl FnMut(&'a StringSite)) {
        annotations_sites(&self.visible_annotations, f);
        annotations_sites(&self.invisible_annotations, f);

        for method in &self.methods {
            for insn in &method.instructions {
                match insn {
                    Instruction::LoadConstant { constant, .. } => constant_site(constant, f),
                    Instruction::InvokeDynamic { arguments, .. } => {
                        for arg in arguments {
                            constant_site(arg, f);
                        }
                    }
                    Instruction::Other { .. } => {}
                }
            }
            annotations_sites(&method.visible_annotations, f);
            annotations_sites(&method.invisible_annotations, f);
            for params in method
                .visible_parameter_annotations
                .iter()
                .chain(&method.invisible_parameter_annotations)
            {
                annotations_sites(params, f);
            }
            if let Some(value) = &method.annotation_default {
                element_sites(value, f);
            }
        }

        for field in &self.fields {
            if let Some(constant) = &field.constant {
                constant_site(constant, f);
            }
            annotations_sites(&field.visible_annotations, f);
            annotations_sites(&field.invisible_annotations, f);
        }
    }

    /// Whether any site holds text different from what was decoded.
    pub fn is_modified(&self) -> bool {
        let mut modified = false;
        self.for_each_site(&mut |site| modified |= site.is_modified());
        modified
    }
}

fn constant_site<'a>(constant: &'a Constant, f: &mut impl FnMut(&'a StringSite)) {
    if let Constant::String(site) = constant {
        f(site);
    }
}

fn annotations_sites<'a>(annotations: &'a [Annotation], f: &mut impl FnMut(&'a StringSite)) {
    for annotation in annotations {
        for pair in &annotation.elements {
            element_sites(&pair.value, f);
        }
    }
}

fn element_sites<'a>(value: &'a ElementValue, f: &mut impl FnMut(&'a StringSite)) {
    match value {
        ElementValue::String(site) => f(site),
        ElementValue::Array(values) => {
            for v in values {
                element_sites(v, f);
            }
        }
        ElementValue::Annotation(nested) => annotations_sites(std::slice::from_ref(nested), f),
        ElementValue::OpaqueString
        | ElementValue::Scalar { .. }
        | ElementValue::Enum { .. }
        | ElementValue::Class(_) => {}
    }
}
