use std::collections::{BTreeMap, HashMap, HashSet};

use super::ClassFileError;
use super::bytes::{write_u1, write_u2, write_u2_at};
use super::mutf8;
use super::pool::{ConstantPool, PoolEntry, TAG_STRING, TAG_UTF8};
use super::tree::{ClassTree, Slot, SlotKind};

const MAX_POOL_COUNT: u32 = 0xFFFF;

/// Encodes a class tree back into class file bytes.
///
/// The original bytes are re-emitted with three kinds of edits: new
/// `CONSTANT_Utf8` / `CONSTANT_String` entries appended to the pool for
/// changed text, the index operand of each changed site patched to point at
/// them, and, when an `ldc` site changed, its `CONSTANT_String` entry
/// repointed at the new text. No length anywhere else in the file changes.
/// A tree without modified sites encodes to exactly the bytes it was
/// decoded from.
pub fn encode(tree: &ClassTree) -> Result<Vec<u8>, ClassFileError> {
    let source = &tree.source;
    let pool = &source.pool;

    // References to each CONSTANT_String, with the text each one wants.
    // `None` means "whatever the entry held originally".
    let mut string_refs: BTreeMap<u16, Vec<(Slot, Option<&str>)>> = BTreeMap::new();
    let mut utf8_sites = Vec::new();
    let mut covered = HashSet::new();
    tree.for_each_site(&mut |site| {
        let wanted = site.is_modified().then_some(site.value.as_str());
        match site.slot.kind {
            SlotKind::Utf8 => utf8_sites.push((site.slot, wanted)),
            SlotKind::NarrowString | SlotKind::WideString => {
                covered.insert(site.slot.position);
                string_refs
                    .entry(site.slot.index)
                    .or_default()
                    .push((site.slot, wanted));
            }
        }
    });

    if string_refs.values().flatten().all(|(_, wanted)| wanted.is_none())
        && utf8_sites.iter().all(|(_, wanted)| wanted.is_none())
    {
        return Ok(source.bytes.clone());
    }

    // Bootstrap arguments no site exposes still need their original text.
    for slot in &source.string_arguments {
        if !covered.contains(&slot.position) {
            string_refs.entry(slot.index).or_default().push((*slot, None));
        }
    }

    let mut appender = Appender::new(pool);
    let mut patches = Patches::default();

    for (index, refs) in &string_refs {
        if refs.iter().all(|(_, wanted)| wanted.is_none()) {
            continue;
        }
        let original_utf8 = pool.string_utf8(*index)?;

        // A one-byte ldc operand cannot follow the text to a new entry, so
        // the entry itself takes the text the first ldc wants.
        let primary = refs
            .iter()
            .find(|(slot, _)| slot.kind == SlotKind::NarrowString)
            .and_then(|(_, wanted)| *wanted);
        if let Some(text) = primary {
            let utf8 = appender.utf8(text)?;
            let PoolEntry::String { utf8_pos, .. } = pool.entry(*index)? else {
                return Err(ClassFileError::malformed(format!(
                    "constant {index} is not a String entry"
                )));
            };
            patches.set(*utf8_pos, SlotKind::WideString, utf8)?;
        }

        for (slot, wanted) in refs {
            if *wanted == primary {
                continue;
            }
            // Reaching `None` here means the entry was repointed away from it.
            let target = match wanted {
                Some(text) => appender.string(text)?,
                None => appender.string_for_utf8(original_utf8)?,
            };
            if slot.kind == SlotKind::NarrowString && target > 0xFF {
                return Err(ClassFileError::NarrowIndexOverflow {
                    position: slot.position,
                    index: target,
                });
            }
            patches.set(slot.position, slot.kind, target)?;
        }
    }

    for (slot, wanted) in &utf8_sites {
        if let Some(text) = wanted {
            let target = appender.utf8(text)?;
            patches.set(slot.position, slot.kind, target)?;
        }
    }

    Ok(assemble(&source.bytes, pool, &appender, &patches))
}

fn assemble(bytes: &[u8], pool: &ConstantPool, appender: &Appender<'_>, patches: &Patches) -> Vec<u8> {
    let pool_end = pool.end();
    let shift = appender.bytes.len();

    let mut out = Vec::with_capacity(bytes.len() + shift);
    out.extend_from_slice(&bytes[..8]);
    write_u2(&mut out, appender.next as u16);
    out.extend_from_slice(&bytes[10..pool_end]);
    out.extend_from_slice(&appender.bytes);
    out.extend_from_slice(&bytes[pool_end..]);

    for (position, (kind, index)) in &patches.0 {
        let at = if *position < pool_end {
            *position
        } else {
            *position + shift
        };
        match kind {
            SlotKind::NarrowString => out[at] = *index as u8,
            SlotKind::WideString | SlotKind::Utf8 => write_u2_at(&mut out, at, *index),
        }
    }
    out
}

/// Index operands to overwrite, keyed by their absolute input offset.
#[derive(Debug, Default)]
struct Patches(HashMap<usize, (SlotKind, u16)>);

impl Patches {
    fn set(&mut self, position: usize, kind: SlotKind, index: u16) -> Result<(), ClassFileError> {
        match self.0.insert(position, (kind, index)) {
            Some((_, previous)) if previous != index => {
                Err(ClassFileError::ConflictingSharedSite { position })
            }
            _ => Ok(()),
        }
    }
}

/// Constant pool entries appended after the original ones.
struct Appender<'p> {
    pool: &'p ConstantPool,
    next: u32,
    bytes: Vec<u8>,
    utf8: HashMap<Vec<u8>, u16>,
    strings: HashMap<u16, u16>,
}

impl<'p> Appender<'p> {
    fn new(pool: &'p ConstantPool) -> Self {
        Self {
            pool,
            next: u32::from(pool.count()),
            bytes: Vec::new(),
            utf8: HashMap::new(),
            strings: HashMap::new(),
        }
    }

    /// A `CONSTANT_Utf8` holding `text`, reusing an existing one if possible.
    fn utf8(&mut self, text: &str) -> Result<u16, ClassFileError> {
        let encoded = mutf8::encode(text);
        if encoded.len() > usize::from(u16::MAX) {
            return Err(ClassFileError::StringTooLong {
                len: encoded.len(),
            });
        }
        if let Some(index) = self.pool.find_utf8(&encoded) {
            return Ok(index);
        }
        if let Some(index) = self.utf8.get(&encoded) {
            return Ok(*index);
        }

        let index = self.allocate()?;
        write_u1(&mut self.bytes, TAG_UTF8);
        write_u2(&mut self.bytes, encoded.len() as u16);
        self.bytes.extend_from_slice(&encoded);
        self.utf8.insert(encoded, index);
        Ok(index)
    }

    /// A fresh `CONSTANT_String` holding `text`.
    fn string(&mut self, text: &str) -> Result<u16, ClassFileError> {
        let utf8 = self.utf8(text)?;
        self.string_for_utf8(utf8)
    }

    fn string_for_utf8(&mut self, utf8: u16) -> Result<u16, ClassFileError> {
        if let Some(index) = self.strings.get(&utf8) {
            return Ok(*index);
        }
        let index = self.allocate()?;
        write_u1(&mut self.bytes, TAG_STRING);
        write_u2(&mut self.bytes, utf8);
        self.strings.insert(utf8, index);
        Ok(index)
    }

    fn allocate(&mut self) -> Result<u16, ClassFileError> {
        if self.next >= MAX_POOL_COUNT {
            return Err(ClassFileError::PoolOverflow);
        }
        let index = self.next as u16;
        self.next += 1;
        Ok(index)
    }
}
