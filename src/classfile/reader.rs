use super::ClassFileError;
use super::bytes::ByteReader;
use super::code::{self, RawInstruction};
use super::mutf8;
use super::pool::{ConstantPool, MethodHandle, PoolEntry};
use super::tree::{
    Annotation, ClassTree, Constant, ElementPair, ElementValue, FieldDecl, Instruction,
    MethodDecl, Slot, SlotKind, Source, StringSite,
};

const MAGIC: u32 = 0xCAFE_BABE;
const MAX_ANNOTATION_DEPTH: usize = 256;

/// Decodes a class file into a [`ClassTree`].
///
/// Fails if the bytes are not a structurally valid class file, or if an
/// annotation carries an element value tag outside the known set.
pub fn decode(bytes: &[u8]) -> Result<ClassTree, ClassFileError> {
    let mut r = ByteReader::new(bytes);
    let magic = r.u4()?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }
    let minor_version = r.u2()?;
    let major_version = r.u2()?;
    let pool = ConstantPool::parse(&mut r)?;

    let access_flags = r.u2()?;
    let name = pool.class_name(r.u2()?)?;
    let super_name = match r.u2()? {
        0 => None,
        index => Some(pool.class_name(index)?),
    };
    let interfaces = (0..r.u2()?)
        .map(|_| pool.class_name(r.u2()?))
        .collect::<Result<Vec<_>, _>>()?;

    let mut fields = Vec::new();
    for _ in 0..r.u2()? {
        fields.push(read_field(&mut r, bytes, &pool)?);
    }

    let mut pending = Vec::new();
    for _ in 0..r.u2()? {
        pending.push(read_method(&mut r, bytes, &pool)?);
    }

    let mut visible_annotations = Vec::new();
    let mut invisible_annotations = Vec::new();
    let mut bootstrap_methods = Vec::new();
    for attr in read_attributes(&mut r, &pool)? {
        match attr.name.as_str() {
            "RuntimeVisibleAnnotations" => {
                visible_annotations = attr.parse(bytes, |r| read_annotations(r, &pool))?;
            }
            "RuntimeInvisibleAnnotations" => {
                invisible_annotations = attr.parse(bytes, |r| read_annotations(r, &pool))?;
            }
            "BootstrapMethods" => {
                bootstrap_methods = attr.parse(bytes, |r| read_bootstrap_methods(r, &pool))?;
            }
            _ => {}
        }
    }

    if !r.is_empty() {
        return Err(ClassFileError::malformed(format!(
            "{} trailing bytes after class attributes",
            bytes.len() - r.pos()
        )));
    }

    let methods = pending
        .into_iter()
        .map(|m| m.resolve(bytes, &pool, &bootstrap_methods))
        .collect::<Result<Vec<_>, _>>()?;

    let string_arguments = bootstrap_methods
        .iter()
        .flat_map(|bsm| bsm.arguments.iter())
        .filter(|arg| matches!(pool.entry(arg.index), Ok(PoolEntry::String { .. })))
        .map(|arg| Slot {
            kind: SlotKind::WideString,
            position: arg.position,
            index: arg.index,
        })
        .collect();

    Ok(ClassTree {
        minor_version,
        major_version,
        access_flags,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        visible_annotations,
        invisible_annotations,
        source: Source {
            bytes: bytes.to_vec(),
            pool,
            string_arguments,
        },
    })
}

/// Header of one attribute; its body is `bytes[start..start + len]`.
struct Attribute {
    name: String,
    start: usize,
    len: usize,
}

impl Attribute {
    /// Runs `f` over the body and checks that it consumed exactly `len` bytes.
    fn parse<'a, T>(
        &self,
        bytes: &'a [u8],
        f: impl FnOnce(&mut ByteReader<'a>) -> Result<T, ClassFileError>,
    ) -> Result<T, ClassFileError> {
        let end = self.start + self.len;
        let mut r = ByteReader::at(&bytes[..end], self.start);
        let value = f(&mut r)?;
        if r.pos() != end {
            return Err(ClassFileError::malformed(format!(
                "{} attribute at offset {} declares {} bytes but holds {}",
                self.name,
                self.start,
                self.len,
                r.pos() - self.start
            )));
        }
        Ok(value)
    }
}

fn read_attributes(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Attribute>, ClassFileError> {
    let count = r.u2()?;
    let mut attrs = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(r.u2()?)?;
        let len = r.u4()? as usize;
        let start = r.pos();
        r.skip(len)?;
        attrs.push(Attribute { name, start, len });
    }
    Ok(attrs)
}

fn read_field(
    r: &mut ByteReader<'_>,
    bytes: &[u8],
    pool: &ConstantPool,
) -> Result<FieldDecl, ClassFileError> {
    let access_flags = r.u2()?;
    let name = pool.utf8(r.u2()?)?;
    let descriptor = pool.utf8(r.u2()?)?;

    let mut field = FieldDecl {
        access_flags,
        name,
        descriptor,
        constant: None,
        visible_annotations: Vec::new(),
        invisible_annotations: Vec::new(),
    };

    for attr in read_attributes(r, pool)? {
        match attr.name.as_str() {
            "ConstantValue" => {
                let constant = attr.parse(bytes, |r| {
                    let position = r.pos();
                    let index = r.u2()?;
                    resolve_constant(pool, index, SlotKind::WideString, position)
                })?;
                field.constant = Some(constant);
            }
            "RuntimeVisibleAnnotations" => {
                field.visible_annotations = attr.parse(bytes, |r| read_annotations(r, pool))?;
            }
            "RuntimeInvisibleAnnotations" => {
                field.invisible_annotations = attr.parse(bytes, |r| read_annotations(r, pool))?;
            }
            _ => {}
        }
    }

    Ok(field)
}

/// A method whose instructions wait for the `BootstrapMethods` attribute,
/// which follows the methods in the file.
struct PendingMethod {
    decl: MethodDecl,
    code: Option<(usize, usize)>,
}

impl PendingMethod {
    fn resolve(
        mut self,
        bytes: &[u8],
        pool: &ConstantPool,
        bootstrap_methods: &[BootstrapEntry],
    ) -> Result<MethodDecl, ClassFileError> {
        let Some((start, len)) = self.code else {
            return Ok(self.decl);
        };

        self.decl.instructions = code::decode_code(bytes, start, len)?
            .into_iter()
            .map(|raw| resolve_instruction(raw, pool, bootstrap_methods))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.decl)
    }
}

fn read_method(
    r: &mut ByteReader<'_>,
    bytes: &[u8],
    pool: &ConstantPool,
) -> Result<PendingMethod, ClassFileError> {
    let access_flags = r.u2()?;
    let name = pool.utf8(r.u2()?)?;
    let descriptor = pool.utf8(r.u2()?)?;

    let mut method = PendingMethod {
        decl: MethodDecl {
            access_flags,
            name,
            descriptor,
            instructions: Vec::new(),
            visible_annotations: Vec::new(),
            invisible_annotations: Vec::new(),
            visible_parameter_annotations: Vec::new(),
            invisible_parameter_annotations: Vec::new(),
            annotation_default: None,
        },
        code: None,
    };

    for attr in read_attributes(r, pool)? {
        let decl = &mut method.decl;
        match attr.name.as_str() {
            "Code" => {
                if method.code.is_some() {
                    return Err(ClassFileError::malformed(format!(
                        "method {}{} has more than one Code attribute",
                        decl.name, decl.descriptor
                    )));
                }
                let end = attr.start + attr.len;
                let mut body = ByteReader::at(&bytes[..end], attr.start);
                body.skip(4)?;
                let code_len = body.u4()? as usize;
                let code_start = body.pos();
                body.skip(code_len)?;
                method.code = Some((code_start, code_len));
            }
            "RuntimeVisibleAnnotations" => {
                decl.visible_annotations = attr.parse(bytes, |r| read_annotations(r, pool))?;
            }
            "RuntimeInvisibleAnnotations" => {
                decl.invisible_annotations = attr.parse(bytes, |r| read_annotations(r, pool))?;
            }
            "RuntimeVisibleParameterAnnotations" => {
                decl.visible_parameter_annotations =
                    attr.parse(bytes, |r| read_parameter_annotations(r, pool))?;
            }
            "RuntimeInvisibleParameterAnnotations" => {
                decl.invisible_parameter_annotations =
                    attr.parse(bytes, |r| read_parameter_annotations(r, pool))?;
            }
            "AnnotationDefault" => {
                decl.annotation_default =
                    Some(attr.parse(bytes, |r| read_element_value(r, pool, 0))?);
            }
            _ => {}
        }
    }

    Ok(method)
}

struct BootstrapArgument {
    index: u16,
    position: usize,
}

struct BootstrapEntry {
    handle: MethodHandle,
    arguments: Vec<BootstrapArgument>,
}

fn read_bootstrap_methods(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<BootstrapEntry>, ClassFileError> {
    let count = r.u2()?;
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let handle = pool.method_handle(r.u2()?)?;
        let argc = r.u2()?;
        let mut arguments = Vec::with_capacity(usize::from(argc));
        for _ in 0..argc {
            let position = r.pos();
            let index = r.u2()?;
            pool.entry(index)?;
            arguments.push(BootstrapArgument { index, position });
        }
        entries.push(BootstrapEntry { handle, arguments });
    }
    Ok(entries)
}

fn resolve_instruction(
    raw: RawInstruction,
    pool: &ConstantPool,
    bootstrap_methods: &[BootstrapEntry],
) -> Result<Instruction, ClassFileError> {
    match raw {
        RawInstruction::Ldc {
            offset,
            opcode,
            index,
            index_pos,
        } => {
            let kind = if opcode == code::LDC {
                SlotKind::NarrowString
            } else {
                SlotKind::WideString
            };
            Ok(Instruction::LoadConstant {
                offset,
                opcode,
                constant: resolve_constant(pool, index, kind, index_pos)?,
            })
        }
        RawInstruction::InvokeDynamic { offset, index } => {
            let (bootstrap, name_and_type) = match pool.entry(index)? {
                PoolEntry::Dynamic {
                    tag: 18,
                    bootstrap,
                    name_and_type,
                } => (*bootstrap, *name_and_type),
                _ => {
                    return Err(ClassFileError::malformed(format!(
                        "invokedynamic at offset {offset} does not name an InvokeDynamic constant"
                    )));
                }
            };
            let entry = bootstrap_methods
                .get(usize::from(bootstrap))
                .ok_or_else(|| {
                    ClassFileError::malformed(format!(
                        "invokedynamic at offset {offset} uses missing bootstrap method {bootstrap}"
                    ))
                })?;
            let (name, descriptor) = pool.name_and_type(name_and_type)?;
            let arguments = entry
                .arguments
                .iter()
                .map(|arg| resolve_constant(pool, arg.index, SlotKind::WideString, arg.position))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Instruction::InvokeDynamic {
                offset,
                name,
                descriptor,
                bootstrap: entry.handle.clone(),
                arguments,
            })
        }
        RawInstruction::Other { offset, opcode } => Ok(Instruction::Other { offset, opcode }),
    }
}

/// Resolves a loadable constant referenced from `position`.
fn resolve_constant(
    pool: &ConstantPool,
    index: u16,
    kind: SlotKind,
    position: usize,
) -> Result<Constant, ClassFileError> {
    let constant = match pool.entry(index)? {
        PoolEntry::String { utf8, .. } => match mutf8::decode(pool.utf8_bytes(*utf8)?) {
            Some(text) => Constant::String(StringSite::new(
                text,
                Slot {
                    kind,
                    position,
                    index,
                },
            )),
            None => Constant::OpaqueString,
        },
        PoolEntry::Integer(v) => Constant::Integer(*v),
        PoolEntry::Float(v) => Constant::Float(*v),
        PoolEntry::Long(v) => Constant::Long(*v),
        PoolEntry::Double(v) => Constant::Double(*v),
        PoolEntry::Class { name } => Constant::Class(pool.utf8(*name)?),
        PoolEntry::MethodType { descriptor } => Constant::MethodType(pool.utf8(*descriptor)?),
        PoolEntry::MethodHandle { .. } => Constant::MethodHandle(pool.method_handle(index)?),
        PoolEntry::Dynamic {
            tag: 17,
            name_and_type,
            ..
        } => {
            let (name, descriptor) = pool.name_and_type(*name_and_type)?;
            Constant::Dynamic { name, descriptor }
        }
        _ => {
            return Err(ClassFileError::malformed(format!(
                "constant {index} referenced at offset {position} is not loadable"
            )));
        }
    };
    Ok(constant)
}

fn read_parameter_annotations(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Vec<Annotation>>, ClassFileError> {
    let count = r.u1()?;
    (0..count).map(|_| read_annotations(r, pool)).collect()
}

fn read_annotations(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<Annotation>, ClassFileError> {
    let count = r.u2()?;
    (0..count).map(|_| read_annotation(r, pool, 0)).collect()
}

fn read_annotation(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<Annotation, ClassFileError> {
    let type_descriptor = pool.utf8(r.u2()?)?;
    let count = r.u2()?;
    let mut elements = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(r.u2()?)?;
        let value = read_element_value(r, pool, depth + 1)?;
        elements.push(ElementPair { name, value });
    }
    Ok(Annotation {
        type_descriptor,
        elements,
    })
}

fn read_element_value(
    r: &mut ByteReader<'_>,
    pool: &ConstantPool,
    depth: usize,
) -> Result<ElementValue, ClassFileError> {
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFileError::malformed(format!(
            "annotation values nested deeper than {MAX_ANNOTATION_DEPTH} levels"
        )));
    }

    let tag = r.u1()?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' | b'D' | b'F' | b'J' => {
            let index = r.u2()?;
            let value = match (tag, pool.entry(index)?) {
                (b'D', PoolEntry::Double(v)) => Constant::Double(*v),
                (b'F', PoolEntry::Float(v)) => Constant::Float(*v),
                (b'J', PoolEntry::Long(v)) => Constant::Long(*v),
                (b'B' | b'C' | b'I' | b'S' | b'Z', PoolEntry::Integer(v)) => Constant::Integer(*v),
                _ => {
                    return Err(ClassFileError::malformed(format!(
                        "annotation value tag {:?} does not match constant {index}",
                        char::from(tag)
                    )));
                }
            };
            ElementValue::Scalar { tag, value }
        }
        b's' => {
            let position = r.pos();
            let index = r.u2()?;
            match mutf8::decode(pool.utf8_bytes(index)?) {
                Some(text) => ElementValue::String(StringSite::new(
                    text,
                    Slot {
                        kind: SlotKind::Utf8,
                        position,
                        index,
                    },
                )),
                None => ElementValue::OpaqueString,
            }
        }
        b'e' => ElementValue::Enum {
            type_descriptor: pool.utf8(r.u2()?)?,
            name: pool.utf8(r.u2()?)?,
        },
        b'c' => ElementValue::Class(pool.utf8(r.u2()?)?),
        b'@' => ElementValue::Annotation(read_annotation(r, pool, depth + 1)?),
        b'[' => {
            let count = r.u2()?;
            let values = (0..count)
                .map(|_| read_element_value(r, pool, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            ElementValue::Array(values)
        }
        other => return Err(ClassFileError::UnsupportedAnnotationValue { tag: other }),
    };
    Ok(value)
}
