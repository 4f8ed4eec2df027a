/*!
  The 32 bit flag-word multiplexing a function's modifiers with either a code
  address, an inherit-table index, or a cross-definition offset. The wire
  layout is bit-exact and shared with the variable flags:

  ```text
  bit 31        NAME_INHERITED    entry was copied from an inherited program
  bits 30..23   modifier bits     static, nomask, private, public,
                                  varargs/initialized, virtual, protected,
                                  xvarargs
  bit 19        NAME_CROSS_DEFINED  (only meaningful when bit 31 is set)
  bits 19..0    code address          when neither tag bit is set
  bits 17..0    inherit-table index   when inherited and not cross-defined
  bits 17..0    biased delta          when inherited and cross-defined
  ```

  A consumer must test the tag bits before touching the low bits; reading an
  inherit index as an address is a format violation. In memory the word is
  therefore handled as the safe tagged `FunctionEntry` plus a `Modifiers`
  bit-set, with `pack`/`unpack` reproducing the wire form exactly.
*/

use std::fmt::{Display, Formatter};
use std::ops::{BitOr, BitOrAssign};

use crate::error::LinkError;

// region Bit layout constants

pub const NAME_INHERITED     : u32 = 0x8000_0000;
pub const NAME_CROSS_DEFINED : u32 = 0x0008_0000;

/// Address field of an own function, relative to the start of the code
/// buffer. 20 bits wide, although the builder never produces an address past
/// the 16 bit code-size limit; the headroom is accepted when decoding.
pub const FUNSTART_MASK : u32 = 0x000F_FFFF;

/// Inherit-table index of an inherited function, or the biased
/// cross-definition delta. 18 bits wide.
pub const INHERIT_MASK : u32 = 0x0003_FFFF;

/// Bias added to a cross-definition delta before it is stored in the
/// 18 bit field, centering the representable range on zero.
pub const CROSS_DEFINED_BIAS : i32 = 0x0002_0000;

/// Address sentinel for a function that was referenced but never defined.
pub const UNDEFINED_ADDRESS : u32 = FUNSTART_MASK;

// endregion

/**
  The visibility, redefinability and state modifier bits shared by function
  and variable flag-words. They sit above the address field, are independent
  of which tagged variant the word carries, and are preserved verbatim when
  an entry is copied from a parent program into a child's directory.
*/
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct Modifiers(u32);

impl Modifiers {
  /// Static function or variable
  pub const STATIC      : Modifiers = Modifiers(0x4000_0000);
  /// Not redefinable by inheriting programs
  pub const NO_MASK     : Modifiers = Modifiers(0x2000_0000);
  /// Not visible to inheriting programs
  pub const PRIVATE     : Modifiers = Modifiers(0x1000_0000);
  /// Forced visible through a private inherit
  pub const PUBLIC      : Modifiers = Modifiers(0x0800_0000);
  /// Function accepts varargs
  pub const VARARGS     : Modifiers = Modifiers(0x0400_0000);
  /// Variable has an initializer; shares the `VARARGS` bit
  pub const INITIALIZED : Modifiers = Modifiers(0x0400_0000);
  /// Reached through a virtual inheritance edge
  pub const VIRTUAL     : Modifiers = Modifiers(0x0200_0000);
  /// Not callable from outside the object
  pub const PROTECTED   : Modifiers = Modifiers(0x0100_0000);
  /// Accepts trailing optional arguments
  pub const XVARARGS    : Modifiers = Modifiers(0x0080_0000);

  /// Every bit a modifier may occupy.
  pub const MASK : u32 = 0x7F80_0000;

  pub fn empty() -> Modifiers {
    Modifiers(0)
  }

  /// Masks arbitrary bits down to the modifier field.
  pub fn from_bits(bits: u32) -> Modifiers {
    Modifiers(bits & Modifiers::MASK)
  }

  pub fn bits(&self) -> u32 {
    self.0
  }

  pub fn contains(&self, other: Modifiers) -> bool {
    self.0 & other.0 == other.0
  }
}

impl BitOr for Modifiers {
  type Output = Modifiers;
  fn bitor(self, rhs: Modifiers) -> Modifiers {
    Modifiers(self.0 | rhs.0)
  }
}

impl BitOrAssign for Modifiers {
  fn bitor_assign(&mut self, rhs: Modifiers) {
    self.0 |= rhs.0;
  }
}

impl Display for Modifiers {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let names = [
      (Modifiers::STATIC,    "static"),
      (Modifiers::NO_MASK,   "nomask"),
      (Modifiers::PRIVATE,   "private"),
      (Modifiers::PUBLIC,    "public"),
      (Modifiers::VARARGS,   "varargs"),
      (Modifiers::VIRTUAL,   "virtual"),
      (Modifiers::PROTECTED, "protected"),
      (Modifiers::XVARARGS,  "xvarargs"),
    ];
    let set = names
      .iter()
      .filter(|(m, _)| self.contains(*m))
      .map(|(_, name)| *name)
      .collect::<Vec<&str>>();
    write!(f, "{}", set.join(" "))
  }
}

/**
  The tagged payload of a function flag-word.

  * `Own`: the function's code lives in this program; the payload is the
    address of its header's arg-count byte in the code buffer.
  * `Inherited`: the payload indexes this program's inherit table, and the
    referenced program must be consulted recursively for the real entry.
  * `CrossDefined`: the function is reachable by name through this slot but
    its real entry sits at a sibling index; the payload is the signed
    distance from this index to the real one.
*/
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FunctionEntry {
  Own{ address: u32 },
  Inherited{ inherit_index: u32 },
  CrossDefined{ delta: i32 }
}

impl FunctionEntry {

  /// Packs the entry and its modifiers into the wire form.
  pub fn pack(&self, modifiers: Modifiers) -> Result<u32, LinkError> {
    let word = match *self {

      FunctionEntry::Own{ address } => {
        if address > FUNSTART_MASK {
          return Err(LinkError::AddressOutOfRange{ address });
        }
        address
      }

      FunctionEntry::Inherited{ inherit_index } => {
        if inherit_index > INHERIT_MASK {
          return Err(LinkError::InheritIndexOutOfRange{ index: inherit_index });
        }
        NAME_INHERITED | inherit_index
      }

      FunctionEntry::CrossDefined{ delta } => {
        let biased = delta + CROSS_DEFINED_BIAS;
        if biased < 0 || biased as u32 > INHERIT_MASK {
          return Err(LinkError::DeltaOutOfRange{ delta });
        }
        NAME_INHERITED | NAME_CROSS_DEFINED | biased as u32
      }

    };
    Ok(word | modifiers.bits())
  }

  /// Unpacks a wire flag-word into its tagged payload and modifiers. Total:
  /// every 32 bit pattern decodes to some variant, the tag bits simply
  /// select which low-bit interpretation applies.
  pub fn unpack(word: u32) -> (FunctionEntry, Modifiers) {
    let modifiers = Modifiers::from_bits(word);

    let entry = if word & NAME_INHERITED == 0 {
      FunctionEntry::Own{ address: word & FUNSTART_MASK }
    }
    else if word & NAME_CROSS_DEFINED != 0 {
      FunctionEntry::CrossDefined{
        delta: (word & INHERIT_MASK) as i32 - CROSS_DEFINED_BIAS
      }
    }
    else {
      FunctionEntry::Inherited{ inherit_index: word & INHERIT_MASK }
    };

    (entry, modifiers)
  }

  pub fn is_undefined(&self) -> bool {
    *self == FunctionEntry::Own{ address: UNDEFINED_ADDRESS }
  }
}

impl Display for FunctionEntry {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      FunctionEntry::Own{ address } if *address == UNDEFINED_ADDRESS => {
        write!(f, "undefined")
      }

      FunctionEntry::Own{ address } => {
        write!(f, "code[{:#x}]", address)
      }

      FunctionEntry::Inherited{ inherit_index } => {
        write!(f, "inherit[{}]", inherit_index)
      }

      FunctionEntry::CrossDefined{ delta } => {
        write!(f, "cross({:+})", delta)
      }

    }
  }
}
