/*!
  The variable-width opcode scheme and branch operand arithmetic.

  Logical opcodes up to 255 occupy one byte. A larger opcode is split into an
  escape byte `opcode >> ESCAPE_BITS` followed by a residual byte
  `opcode & 0x7F`. The escape bytes this split can produce are exactly the
  reserved marker values 2, 3 and 4, so a decoder needs no lookahead: read one
  byte, and read a second one iff the first is a marker. The marker values are
  consequently never assigned as complete one-byte opcodes.

  Branch operands are signed 16 bit offsets relative to the first byte
  *after* the operand, not to the branch opcode's own address.
*/

use std::convert::TryFrom;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::error::LinkError;
use super::cursor::{put_i16, put_u8, Cursor};

/// Width of the residual byte's payload.
pub const ESCAPE_BITS: u16 = 7;

/// First logical opcode needing the two-byte form.
pub const FIRST_TWO_BYTE_OPCODE: u16 = 256;

/// Largest logical opcode the escape scheme can carry: the residual of the
/// last reserved marker, `(Vefun + 1) * 128 - 1`.
pub const LARGEST_OPCODE: u16 = 639;

/**
  The reserved escape markers. Their numeric values are the high bytes
  produced by `opcode >> ESCAPE_BITS` for the two-byte opcode ranges, which
  is why those values cannot double as one-byte opcodes.
*/
#[derive(
StrumDisplay, IntoStaticStr, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,          Eq, PartialEq,    Debug,        Hash
)]
#[repr(u8)]
pub enum EscapeMarker {
  /// High byte of opcodes 256..=383
  Escape = 2,
  /// High byte of opcodes 384..=511, the tabled-efun range
  Tefun  = 3,
  /// High byte of opcodes 512..=639, the vararg-efun range
  Vefun  = 4,
}

/// An `Either` type for an encoded opcode, allowing the opcode to be either
/// one byte or two.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum EncodedOpcode{
  Single(u8),
  Pair(u8, u8)
}

impl EncodedOpcode {
  pub fn len(&self) -> usize {
    match self {
      EncodedOpcode::Single(_)  => 1,
      EncodedOpcode::Pair(_, _) => 2
    }
  }
}

pub fn is_escape_marker(byte: u8) -> bool {
  EscapeMarker::try_from(byte).is_ok()
}

/**
  Encodes a logical opcode into its one- or two-byte form. Fails for opcodes
  past `LARGEST_OPCODE` and for the marker values themselves, which have no
  unambiguous one-byte form.
*/
pub fn encode_opcode(opcode: u16) -> Result<EncodedOpcode, LinkError> {
  if opcode >= FIRST_TWO_BYTE_OPCODE {
    if opcode > LARGEST_OPCODE {
      return Err(LinkError::UnencodableOpcode{ opcode });
    }
    Ok(EncodedOpcode::Pair(
      (opcode >> ESCAPE_BITS) as u8,
      (opcode & 0x7F) as u8
    ))
  }
  else if is_escape_marker(opcode as u8) {
    Err(LinkError::UnencodableOpcode{ opcode })
  }
  else {
    Ok(EncodedOpcode::Single(opcode as u8))
  }
}

/// Appends the encoded form of `opcode` to the code buffer.
pub fn emit_opcode(code: &mut Vec<u8>, opcode: u16) -> Result<(), LinkError> {
  match encode_opcode(opcode)? {

    EncodedOpcode::Single(byte) => {
      put_u8(code, byte);
    }

    EncodedOpcode::Pair(escape, residual) => {
      put_u8(code, escape);
      put_u8(code, residual);
    }

  }
  Ok(())
}

/**
  Decodes the opcode at the cursor, advancing past one byte, or two when the
  first is a reserved escape marker.
*/
pub fn decode_opcode(cursor: &mut Cursor) -> u16 {
  let first = cursor.load_u8();
  match is_escape_marker(first) {
    true  => {
      let residual = cursor.load_u8() as u16;
      ((first as u16) << ESCAPE_BITS) + residual
    }
    false => first as u16
  }
}

/**
  Appends a branch operand targeting absolute code offset `target`. The
  stored value is relative to the first byte following the operand itself.
  A distance outside the signed 16 bit range is an error, never a
  truncation.
*/
pub fn emit_branch_operand(code: &mut Vec<u8>, target: usize) -> Result<(), LinkError> {
  let after_operand = code.len() + 2;
  let offset = target as i64 - after_operand as i64;
  if offset < i16::min_value() as i64 || offset > i16::max_value() as i64 {
    return Err(LinkError::BranchOffsetOutOfRange{ offset });
  }
  put_i16(code, offset as i16);
  Ok(())
}

/**
  Reads the branch operand at the cursor and returns the absolute code offset
  it targets. A target before the start of the code buffer is a corrupt
  operand and aborts.
*/
pub fn read_branch_target(cursor: &mut Cursor) -> usize {
  let offset = cursor.load_i16();
  let target = cursor.position() as i64 + offset as i64;
  if target < 0 {
    panic!("corrupt branch operand: resolved target {} precedes the code buffer", target);
  }
  target as usize
}
