/*!
  Errors detected while a program is compiled and linked. Every kind is fatal
  to the single compilation that produced it: the caller reports the error to
  the diagnostics sink and drops the in-progress buffers, so no partially
  linked `Program` is ever published.

  Inconsistencies *inside* an already-packed flag-word (tag bits that
  contradict the payload) are not represented here. They signal a linker bug,
  not user input, and abort via `panic!` at the point of discovery.
*/

use thiserror::Error;

/// The source line a declaration sits on, for error reports.
pub type LineNumber = u16;

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum LinkError {
  /// The bytecode buffer would exceed the 16 bit addressing limit.
  #[error("program code grew to {size} bytes, past the 65535 byte limit")]
  CodeTooLarge{ size: usize },

  #[error("line {line}: function directory is full (65535 entries)")]
  TooManyFunctions{ line: LineNumber },

  #[error("line {line}: variable directory is full (65535 entries)")]
  TooManyVariables{ line: LineNumber },

  #[error("string table is full (65535 entries)")]
  TooManyStrings,

  #[error("line {line}: inherit table is full")]
  TooManyInherits{ line: LineNumber },

  /// A virtual base is reachable through two paths whose inherit
  /// declarations carry different explicit visibility. The conflict needs an
  /// explicit resolution in the source; it cannot default silently.
  #[error("line {line}: virtual base \"{name}\" inherited with conflicting visibility")]
  AmbiguousVirtualBase{ name: String, line: LineNumber },

  /// The logical opcode does not fit the one-or-two-byte escape encoding.
  #[error("opcode {opcode} cannot be encoded")]
  UnencodableOpcode{ opcode: u16 },

  /// A branch distance does not fit the signed 16 bit operand.
  #[error("branch offset {offset} does not fit a 16 bit operand")]
  BranchOffsetOutOfRange{ offset: i64 },

  /// A code address does not fit the flag-word address field.
  #[error("code address {address:#x} does not fit the flag-word address field")]
  AddressOutOfRange{ address: u32 },

  /// A cross-definition offset does not fit the biased delta field.
  #[error("cross-definition offset {delta} does not fit the flag-word delta field")]
  DeltaOutOfRange{ delta: i32 },

  /// An inherit-table index does not fit the flag-word index field.
  #[error("inherit index {index} does not fit the flag-word index field")]
  InheritIndexOutOfRange{ index: u32 },
}
