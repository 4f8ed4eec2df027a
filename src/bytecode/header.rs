/*!
  The function header codec. Every function's instructions are preceded in
  the code buffer by a fixed prologue:

  ```text
      name index    (4 bytes, low 16 bits significant)
      return type   (1 byte)
  --> arg count     (1 byte: bit 7 = varargs, bits 6..0 = formal arg count)
      local count   (1 byte, includes hidden break-stack slots for switch)
      instructions...
  ```

  `-->` marks the address stored in the function directory. All four fields
  are recovered from that address by fixed byte offsets, forward or backward;
  no scanning is ever required.
*/

use crate::bytecode::cursor::{put_u32, put_u8, Cursor};

/// Byte offset from the stored function address back to the name field.
pub const NAME_OFFSET: usize = 5;
/// Byte offset from the stored function address to the first instruction.
pub const CODE_OFFSET: usize = 2;

/// Largest representable formal-argument count; bit 7 belongs to the
/// varargs flag.
pub const MAX_FORMAL_ARGS: u8 = 0x7F;

/// The decoded form of a function prologue. The name is an index into the
/// program's string table.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct FunHeader {
  pub name        : u16,
  pub return_type : u8,
  pub num_args    : u8,
  pub varargs     : bool,
  pub num_locals  : u8
}

impl FunHeader {

  /**
    Appends the header to the code buffer and returns the function address,
    i.e. the offset of the arg-count byte, which is what the function
    directory stores. The caller emits the instructions immediately after.
  */
  pub fn emit(&self, code: &mut Vec<u8>) -> usize {
    put_u32(code, self.name as u32);
    put_u8(code, self.return_type);

    let address = code.len();
    put_u8(code, self.arg_byte());
    put_u8(code, self.num_locals);
    address
  }

  /// Recovers a header from the function address it was emitted at.
  pub fn read_at(code: &[u8], address: usize) -> FunHeader {
    let mut cursor  = Cursor::at(code, address - NAME_OFFSET);
    let name        = cursor.load_u32() as u16;
    let return_type = cursor.load_u8();
    let arg_byte    = cursor.load_u8();
    let num_locals  = cursor.load_u8();

    FunHeader{
      name,
      return_type,
      num_args  : arg_byte & MAX_FORMAL_ARGS,
      varargs   : arg_byte & 0x80 != 0,
      num_locals
    }
  }

  /// Offset of the function's first instruction, given its stored address.
  pub fn code_start(address: usize) -> usize {
    address + CODE_OFFSET
  }

  /// The packed arg-count byte: varargs flag in bit 7, count below it. The
  /// count is masked to its field unconditionally so an oversized value can
  /// never leak into the flag bit.
  pub fn arg_byte(&self) -> u8 {
    let count = self.num_args & MAX_FORMAL_ARGS;
    match self.varargs {
      true  => count | 0x80,
      false => count
    }
  }

  /**
    The arg-count byte read as a signed char, the overloaded form some
    consumers rely on: a negative value means the function takes varargs,
    and the count is recovered by masking.
  */
  pub fn num_args_signed(code: &[u8], address: usize) -> i8 {
    Cursor::at(code, address).get_i8()
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_round_trips_through_the_code_buffer() {
    let mut code = vec![0u8; 3]; // unrelated preceding code
    let header = FunHeader{
      name        : 42,
      return_type : 2,
      num_args    : 3,
      varargs     : false,
      num_locals  : 5
    };

    let address = header.emit(&mut code);
    code.extend_from_slice(&[0xEE, 0xEE]); // fake instructions

    assert_eq!(address, 3 + NAME_OFFSET);
    assert_eq!(FunHeader::read_at(&code, address), header);
    assert_eq!(FunHeader::code_start(address), address + 2);
    assert_eq!(code[FunHeader::code_start(address)], 0xEE);
  }

  #[test]
  fn varargs_flag_packs_into_bit_seven() {
    let mut code = Vec::new();
    let header = FunHeader{
      name        : 7,
      return_type : 0,
      num_args    : MAX_FORMAL_ARGS,
      varargs     : true,
      num_locals  : 0
    };

    let address = header.emit(&mut code);
    let recovered = FunHeader::read_at(&code, address);

    assert_eq!(recovered.num_args, MAX_FORMAL_ARGS);
    assert!(recovered.varargs);
  }

  #[test]
  fn oversized_arg_counts_never_reach_the_varargs_bit() {
    let mut code = Vec::new();
    let header = FunHeader{
      name        : 0,
      return_type : 0,
      num_args    : MAX_FORMAL_ARGS + 6,   // bit 7 set in the raw count
      varargs     : false,
      num_locals  : 0
    };

    let address = header.emit(&mut code);
    let recovered = FunHeader::read_at(&code, address);

    assert!(!recovered.varargs);
    assert_eq!(recovered.num_args, 5);
  }

  #[test]
  fn signed_arg_byte_is_negative_for_varargs() {
    let mut code = Vec::new();
    let plain   = FunHeader{ name: 0, return_type: 0, num_args: 2, varargs: false, num_locals: 0 };
    let spread  = FunHeader{ name: 0, return_type: 0, num_args: 2, varargs: true,  num_locals: 0 };

    let p = plain.emit(&mut code);
    let s = spread.emit(&mut code);

    assert_eq!(FunHeader::num_args_signed(&code, p), 2);
    assert!(FunHeader::num_args_signed(&code, s) < 0);
  }
}
