use super::ClassFileError;
use super::bytes::ByteReader;
use super::mutf8;

pub(crate) const TAG_UTF8: u8 = 1;
pub(crate) const TAG_STRING: u8 = 8;

/// One decoded constant pool slot.
#[derive(Debug, Clone)]
pub(crate) enum PoolEntry {
    /// Slot 0 and the upper half of a long or double.
    Unusable,
    Utf8(Vec<u8>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class {
        name: u16,
    },
    String {
        utf8: u16,
        /// Absolute file offset of the `string_index` field.
        utf8_pos: usize,
    },
    MemberRef {
        tag: u8,
        class: u16,
        name_and_type: u16,
    },
    NameAndType {
        name: u16,
        descriptor: u16,
    },
    MethodHandle {
        kind: u8,
        reference: u16,
    },
    MethodType {
        descriptor: u16,
    },
    Dynamic {
        tag: u8,
        bootstrap: u16,
        name_and_type: u16,
    },
    Module {
        name: u16,
    },
    Package {
        name: u16,
    },
}

/// A resolved `CONSTANT_MethodHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    pub kind: u8,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstantPool {
    entries: Vec<PoolEntry>,
    /// Absolute file offset of the first byte after the pool.
    end: usize,
}

impl ConstantPool {
    /// Parses the pool starting at the `constant_pool_count` field.
    pub(crate) fn parse(r: &mut ByteReader<'_>) -> Result<Self, ClassFileError> {
        let count = r.u2()?;
        if count == 0 {
            return Err(ClassFileError::malformed("constant_pool_count is zero"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(PoolEntry::Unusable);
        while entries.len() < usize::from(count) {
            let index = entries.len();
            let tag = r.u1()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = usize::from(r.u2()?);
                    PoolEntry::Utf8(r.bytes(len)?.to_vec())
                }
                3 => PoolEntry::Integer(r.i4()?),
                4 => PoolEntry::Float(f32::from_bits(r.u4()?)),
                5 => PoolEntry::Long(r.u8()? as i64),
                6 => PoolEntry::Double(f64::from_bits(r.u8()?)),
                7 => PoolEntry::Class { name: r.u2()? },
                TAG_STRING => {
                    let utf8_pos = r.pos();
                    PoolEntry::String {
                        utf8: r.u2()?,
                        utf8_pos,
                    }
                }
                9..=11 => PoolEntry::MemberRef {
                    tag,
                    class: r.u2()?,
                    name_and_type: r.u2()?,
                },
                12 => PoolEntry::NameAndType {
                    name: r.u2()?,
                    descriptor: r.u2()?,
                },
                15 => PoolEntry::MethodHandle {
                    kind: r.u1()?,
                    reference: r.u2()?,
                },
                16 => PoolEntry::MethodType {
                    descriptor: r.u2()?,
                },
                17 | 18 => PoolEntry::Dynamic {
                    tag,
                    bootstrap: r.u2()?,
                    name_and_type: r.u2()?,
                },
                19 => PoolEntry::Module { name: r.u2()? },
                20 => PoolEntry::Package { name: r.u2()? },
                other => {
                    return Err(ClassFileError::malformed(format!(
                        "unknown constant pool tag {other} at index {index}"
                    )));
                }
            };
            let wide = matches!(entry, PoolEntry::Long(_) | PoolEntry::Double(_));
            entries.push(entry);
            if wide {
                if entries.len() >= usize::from(count) {
                    return Err(ClassFileError::malformed(format!(
                        "8-byte constant at index {index} overruns the pool"
                    )));
                }
                entries.push(PoolEntry::Unusable);
            }
        }

        let pool = Self {
            entries,
            end: r.pos(),
        };
        pool.check_references()?;
        Ok(pool)
    }

    /// The `constant_pool_count` value: highest usable index plus one.
    pub(crate) fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    pub(crate) fn entry(&self, index: u16) -> Result<&PoolEntry, ClassFileError> {
        match self.entries.get(usize::from(index)) {
            Some(PoolEntry::Unusable) | None => Err(ClassFileError::malformed(format!(
                "constant pool index {index} is not usable"
            ))),
            Some(entry) => Ok(entry),
        }
    }

    pub(crate) fn utf8_bytes(&self, index: u16) -> Result<&[u8], ClassFileError> {
        match self.entry(index)? {
            PoolEntry::Utf8(bytes) => Ok(bytes),
            _ => Err(expected("Utf8", index)),
        }
    }

    /// Text of a `CONSTANT_Utf8` used as a name or descriptor.
    pub(crate) fn utf8(&self, index: u16) -> Result<String, ClassFileError> {
        mutf8::decode(self.utf8_bytes(index)?).ok_or_else(|| {
            ClassFileError::malformed(format!("constant {index} is not valid modified UTF-8"))
        })
    }

    pub(crate) fn class_name(&self, index: u16) -> Result<String, ClassFileError> {
        match self.entry(index)? {
            PoolEntry::Class { name } => self.utf8(*name),
            _ => Err(expected("Class", index)),
        }
    }

    /// Payload of a `CONSTANT_String`: its Utf8 index.
    pub(crate) fn string_utf8(&self, index: u16) -> Result<u16, ClassFileError> {
        match self.entry(index)? {
            PoolEntry::String { utf8, .. } => Ok(*utf8),
            _ => Err(expected("String", index)),
        }
    }

    pub(crate) fn name_and_type(&self, index: u16) -> Result<(String, String), ClassFileError> {
        match self.entry(index)? {
            PoolEntry::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(expected("NameAndType", index)),
        }
    }

    pub(crate) fn member_ref(
        &self,
        index: u16,
    ) -> Result<(String, String, String), ClassFileError> {
        match self.entry(index)? {
            PoolEntry::MemberRef {
                class,
                name_and_type,
                ..
            } => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((owner, name, descriptor))
            }
            _ => Err(expected("Fieldref/Methodref", index)),
        }
    }

    pub(crate) fn method_handle(&self, index: u16) -> Result<MethodHandle, ClassFileError> {
        match self.entry(index)? {
            PoolEntry::MethodHandle { kind, reference } => {
                let (owner, name, descriptor) = self.member_ref(*reference)?;
                Ok(MethodHandle {
                    kind: *kind,
                    owner,
                    name,
                    descriptor,
                })
            }
            _ => Err(expected("MethodHandle", index)),
        }
    }

    /// Finds an existing Utf8 entry with exactly these bytes.
    pub(crate) fn find_utf8(&self, bytes: &[u8]) -> Option<u16> {
        self.entries.iter().position(|e| match e {
            PoolEntry::Utf8(existing) => existing.as_slice() == bytes,
            _ => false,
        })
        .map(|i| i as u16)
    }

    fn check_references(&self) -> Result<(), ClassFileError> {
        for (index, entry) in self.entries.iter().enumerate() {
            let ok = match entry {
                PoolEntry::Class { name }
                | PoolEntry::Module { name }
                | PoolEntry::Package { name } => self.is_utf8(*name),
                PoolEntry::String { utf8, .. } => self.is_utf8(*utf8),
                PoolEntry::MethodType { descriptor } => self.is_utf8(*descriptor),
                PoolEntry::NameAndType { name, descriptor } => {
                    self.is_utf8(*name) && self.is_utf8(*descriptor)
                }
                PoolEntry::MemberRef {
                    class,
                    name_and_type,
                    ..
                } => {
                    matches!(self.entry(*class), Ok(PoolEntry::Class { .. }))
                        && matches!(
                            self.entry(*name_and_type),
                            Ok(PoolEntry::NameAndType { .. })
                        )
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    (1..=9).contains(kind)
                        && matches!(self.entry(*reference), Ok(PoolEntry::MemberRef { .. }))
                }
                PoolEntry::Dynamic { name_and_type, .. } => matches!(
                    self.entry(*name_and_type),
                    Ok(PoolEntry::NameAndType { .. })
                ),
                _ => true,
            };
            if !ok {
                return Err(ClassFileError::malformed(format!(
                    "constant {index} has a dangling or mistyped reference"
                )));
            }
        }
        Ok(())
    }

    fn is_utf8(&self, index: u16) -> bool {
        matches!(self.entry(index), Ok(PoolEntry::Utf8(_)))
    }
}

fn expected(kind: &str, index: u16) -> ClassFileError {
    ClassFileError::malformed(format!("constant {index} is not a {kind} entry"))
}
