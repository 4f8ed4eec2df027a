/*!

  The binary format of a compiled program's code section. The code buffer is
  byte addressed with 16 bit pointers, which caps a program at 65535 bytes of
  code. Opcodes are one byte, or two when the logical opcode is 256 or
  larger; the two-byte form is an escape marker byte followed by a residual
  byte (see `opcode`). Branch operands are signed 16 bit offsets relative to
  the first byte after the operand.

  Every function inside the buffer starts with a fixed header carrying its
  name, return type, argument count and local-variable count (see `header`).
  The function directory stores the offset of the header's arg-count byte,
  from which all header fields and the first instruction are reachable by
  fixed offsets.

  All multi-byte fields are read and written byte-by-byte in little-endian
  order (see `cursor`), so the format does not depend on the host's byte
  order or natural word size.

*/

pub mod cursor;
pub mod header;
pub mod opcode;

pub use cursor::Cursor;
pub use header::FunHeader;
pub use opcode::{decode_opcode, emit_opcode, EncodedOpcode, EscapeMarker};
