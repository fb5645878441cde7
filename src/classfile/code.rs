use super::ClassFileError;
use super::bytes::ByteReader;

pub(crate) const LDC: u8 = 0x12;
pub(crate) const LDC_W: u8 = 0x13;
pub(crate) const LDC2_W: u8 = 0x14;
pub(crate) const INVOKEDYNAMIC: u8 = 0xBA;
const TABLESWITCH: u8 = 0xAA;
const LOOKUPSWITCH: u8 = 0xAB;
const WIDE: u8 = 0xC4;
const IINC: u8 = 0x84;

/// An instruction before its constant operand is resolved against the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawInstruction {
    Ldc {
        offset: u32,
        opcode: u8,
        index: u16,
        /// Absolute file offset of the index operand.
        index_pos: usize,
    },
    InvokeDynamic {
        offset: u32,
        index: u16,
    },
    Other {
        offset: u32,
        opcode: u8,
    },
}

/// Decodes the `code` array of a `Code` attribute that starts at absolute
/// file offset `start` and is `len` bytes long.
pub(crate) fn decode_code(
    data: &[u8],
    start: usize,
    len: usize,
) -> Result<Vec<RawInstruction>, ClassFileError> {
    let end = start + len;
    let code = data
        .get(..end)
        .ok_or_else(|| ClassFileError::malformed("code array overruns the attribute"))?;
    let mut r = ByteReader::at(code, start);
    let mut out = Vec::new();

    while !r.is_empty() {
        let offset = (r.pos() - start) as u32;
        let opcode = r.u1()?;
        let insn = match opcode {
            LDC => {
                let index_pos = r.pos();
                RawInstruction::Ldc {
                    offset,
                    opcode,
                    index: u16::from(r.u1()?),
                    index_pos,
                }
            }
            LDC_W | LDC2_W => {
                let index_pos = r.pos();
                RawInstruction::Ldc {
                    offset,
                    opcode,
                    index: r.u2()?,
                    index_pos,
                }
            }
            INVOKEDYNAMIC => {
                let index = r.u2()?;
                if r.u2()? != 0 {
                    return Err(ClassFileError::malformed(format!(
                        "invokedynamic at offset {offset} has non-zero padding"
                    )));
                }
                RawInstruction::InvokeDynamic { offset, index }
            }
            TABLESWITCH => {
                skip_switch_padding(&mut r, offset)?;
                r.skip(4)?;
                let low = r.i4()?;
                let high = r.i4()?;
                if high < low {
                    return Err(ClassFileError::malformed(format!(
                        "tableswitch at offset {offset} has high < low"
                    )));
                }
                let entries = (i64::from(high) - i64::from(low) + 1) as usize;
                r.skip(entries * 4)?;
                RawInstruction::Other { offset, opcode }
            }
            LOOKUPSWITCH => {
                skip_switch_padding(&mut r, offset)?;
                r.skip(4)?;
                let pairs = r.i4()?;
                if pairs < 0 {
                    return Err(ClassFileError::malformed(format!(
                        "lookupswitch at offset {offset} has negative npairs"
                    )));
                }
                r.skip(pairs as usize * 8)?;
                RawInstruction::Other { offset, opcode }
            }
            WIDE => {
                let modified = r.u1()?;
                match modified {
                    IINC => r.skip(4)?,
                    0x15..=0x19 | 0x36..=0x3A | 0xA9 => r.skip(2)?,
                    other => {
                        return Err(ClassFileError::malformed(format!(
                            "wide at offset {offset} modifies opcode 0x{other:02X}"
                        )));
                    }
                }
                RawInstruction::Other { offset, opcode }
            }
            _ => {
                let operands = operand_len(opcode).ok_or_else(|| {
                    ClassFileError::malformed(format!(
                        "unknown opcode 0x{opcode:02X} at offset {offset}"
                    ))
                })?;
                r.skip(operands)?;
                RawInstruction::Other { offset, opcode }
            }
        };
        out.push(insn);
    }

    Ok(out)
}

fn skip_switch_padding(r: &mut ByteReader<'_>, offset: u32) -> Result<(), ClassFileError> {
    let padding = (4 - ((offset as usize + 1) % 4)) % 4;
    r.skip(padding)
}

/// Operand byte count of every fixed-length opcode.
fn operand_len(opcode: u8) -> Option<usize> {
    let len = match opcode {
        0x00..=0x0F => 0,
        0x10 => 1,
        0x11 => 2,
        0x15..=0x19 => 1,
        0x1A..=0x35 => 0,
        0x36..=0x3A => 1,
        0x3B..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        0x99..=0xA8 => 2,
        0xA9 => 1,
        0xAC..=0xB1 => 0,
        0xB2..=0xB8 => 2,
        0xB9 => 4,
        0xBB => 2,
        0xBC => 1,
        0xBD => 2,
        0xBE | 0xBF => 0,
        0xC0 | 0xC1 => 2,
        0xC2 | 0xC3 => 0,
        0xC5 => 3,
        0xC6 | 0xC7 => 2,
        0xC8 | 0xC9 => 4,
        _ => return None,
    };
    Some(len)
}
