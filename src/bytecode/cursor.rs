/*!
  Fixed-width read and write primitives over the bytecode buffer. Multi-byte
  fields are assembled little-endian byte-by-byte rather than reinterpreted
  from host memory, so the on-disk and in-memory format is identical across
  host byte orders and "byte" widths.

  The read side is deliberately unchecked beyond slice indexing: offsets are
  validated once, when the program is linked, and an out-of-range cursor
  afterwards is a caller bug, not a recoverable failure.
*/

/// A byte-addressable cursor into a code buffer. The `get_*` methods read at
/// the current position without moving it; the `load_*` methods read and
/// advance past the field.
#[derive(Clone, Debug)]
pub struct Cursor<'c> {
  code : &'c [u8],
  pos  : usize
}

impl<'c> Cursor<'c> {

  pub fn new(code: &'c [u8]) -> Cursor<'c> {
    Cursor{ code, pos: 0 }
  }

  pub fn at(code: &'c [u8], pos: usize) -> Cursor<'c> {
    Cursor{ code, pos }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn jump(&mut self, pos: usize) {
    self.pos = pos;
  }

  // region Non-advancing reads

  pub fn get_u8(&self) -> u8 {
    self.code[self.pos]
  }

  pub fn get_i8(&self) -> i8 {
    self.code[self.pos] as i8
  }

  pub fn get_u16(&self) -> u16 {
    (self.code[self.pos] as u16)
      | ((self.code[self.pos + 1] as u16) << 8)
  }

  pub fn get_i16(&self) -> i16 {
    self.get_u16() as i16
  }

  pub fn get_u32(&self) -> u32 {
    (self.code[self.pos] as u32)
      | ((self.code[self.pos + 1] as u32) << 8)
      | ((self.code[self.pos + 2] as u32) << 16)
      | ((self.code[self.pos + 3] as u32) << 24)
  }

  pub fn get_i32(&self) -> i32 {
    self.get_u32() as i32
  }

  // endregion

  // region Advancing reads

  pub fn load_u8(&mut self) -> u8 {
    let value = self.get_u8();
    self.pos += 1;
    value
  }

  pub fn load_i8(&mut self) -> i8 {
    let value = self.get_i8();
    self.pos += 1;
    value
  }

  pub fn load_u16(&mut self) -> u16 {
    let value = self.get_u16();
    self.pos += 2;
    value
  }

  pub fn load_i16(&mut self) -> i16 {
    let value = self.get_i16();
    self.pos += 2;
    value
  }

  pub fn load_u32(&mut self) -> u32 {
    let value = self.get_u32();
    self.pos += 4;
    value
  }

  pub fn load_i32(&mut self) -> i32 {
    let value = self.get_i32();
    self.pos += 4;
    value
  }

  // endregion
}

// region Write primitives

pub fn put_u8(code: &mut Vec<u8>, value: u8) {
  code.push(value);
}

pub fn put_i8(code: &mut Vec<u8>, value: i8) {
  code.push(value as u8);
}

pub fn put_u16(code: &mut Vec<u8>, value: u16) {
  code.push(value as u8);
  code.push((value >> 8) as u8);
}

pub fn put_i16(code: &mut Vec<u8>, value: i16) {
  put_u16(code, value as u16);
}

pub fn put_u32(code: &mut Vec<u8>, value: u32) {
  code.push(value as u8);
  code.push((value >> 8) as u8);
  code.push((value >> 16) as u8);
  code.push((value >> 24) as u8);
}

pub fn put_i32(code: &mut Vec<u8>, value: i32) {
  put_u32(code, value as u32);
}

// endregion
