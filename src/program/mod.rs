/*!

  The compiled program artifact and its directories.

  A `Program` is the immutable result of compiling one source object. It is
  built up in separate growable buffers (see `builder`), flattened against
  its inherited programs (see `linker`), and sealed into one reference
  counted unit. Once sealed it never changes; clones of the object and
  inheriting programs share it read-only through `Rc`.

  Programs form a directed acyclic graph: each `Inherit` descriptor holds a
  shared reference to a parent program, and ownership only ever flows child
  to parent, so no reference cycles can form.

*/

pub mod builder;
pub mod flags;
pub mod linker;

use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

use string_cache::DefaultAtom;

use crate::bytecode::FunHeader;
use flags::{FunctionEntry, Modifiers};

/// `type_start` value for a function without saved argument types.
pub const INDEX_START_NONE: u16 = 65535;

/// Description of one variable, inherited or own. If the variable was
/// reached through a virtual inheritance edge, `Modifiers::VIRTUAL` is
/// OR'ed onto its flags.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Variable {
  pub name  : DefaultAtom,
  pub flags : u32
}

impl Variable {
  pub fn modifiers(&self) -> Modifiers {
    Modifiers::from_bits(self.flags)
  }

  pub fn is_virtual(&self) -> bool {
    self.modifiers().contains(Modifiers::VIRTUAL)
  }
}

/**
  Description of one inherited program: which directory range it occupies in
  the inheriting program, expressed as offsets into the function and
  variable directories.

  A program inherited virtually through several paths gets one descriptor
  per path. `is_duplicate` marks the second and later occurrences: their
  directory slots exist only so indices stay uniform, and every variable
  access through them is canonicalized to the first occurrence (see
  `Program::canonical_variable`). The descriptor deliberately carries no
  forward link to its canonical sibling; resolution happens at access time.
*/
#[derive(Clone, Debug)]
pub struct Inherit {
  pub prog                  : Rc<Program>,
  pub function_index_offset : u16,
  pub variable_index_offset : u16,
  pub is_duplicate          : bool
}

impl Inherit {
  /// Does this descriptor's variable range contain directory index `index`?
  pub fn contains_variable(&self, index: usize) -> bool {
    let start = self.variable_index_offset as usize;
    index >= start && index < start + self.prog.num_variables()
  }
}

/// Saved per-function argument types, present only when type saving was
/// requested at compile time. Types for function `n` start at
/// `type_start[n]`; `INDEX_START_NONE` means none were saved for `n`.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ArgumentTypes {
  pub types      : Box<[u16]>,
  pub type_start : Box<[u16]>
}

/**
  One compiled program: bytecode plus the directories that make every
  function, variable and string reachable by a dense, stable index. All
  sections are sealed together and freed together when the last reference
  is dropped.
*/
#[derive(Debug)]
pub struct Program {
  /// Path of the source object that defined this program.
  pub name : DefaultAtom,
  /// Identity stamp, unique per sealed program. Lets information be
  /// associated with a program without holding a counted reference, and is
  /// how virtual-base occurrences are recognized as the same program.
  pub id_number : i32,
  /// Sum of all section sizes in bytes.
  pub total_size : usize,

  pub(crate) code           : Box<[u8]>,
  pub(crate) functions      : Box<[u32]>,
  pub(crate) function_names : Box<[DefaultAtom]>,
  pub(crate) strings        : Box<[DefaultAtom]>,
  pub(crate) variables      : Box<[Variable]>,
  pub(crate) inherits       : Box<[Inherit]>,
  pub(crate) line_numbers   : Box<[u16]>,
  pub(crate) argument_types : Option<ArgumentTypes>
}

/// Where a function call finally lands after chasing cross-definitions and
/// inherit links: the program whose code buffer holds the function, the
/// directory index within that program, and the code address there.
#[derive(Clone, Debug)]
pub struct FunctionLocation {
  pub prog    : Rc<Program>,
  pub index   : usize,
  pub address : u32
}

static NEXT_ID: AtomicI32 = AtomicI32::new(1);

pub(crate) fn next_id() -> i32 {
  NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

impl Program {

  // region Section accessors

  pub fn code(&self) -> &[u8] {
    &self.code
  }

  pub fn num_functions(&self) -> usize {
    self.functions.len()
  }

  pub fn num_variables(&self) -> usize {
    self.variables.len()
  }

  pub fn num_strings(&self) -> usize {
    self.strings.len()
  }

  pub fn num_inherits(&self) -> usize {
    self.inherits.len()
  }

  /// The packed wire form of function directory entry `index`.
  pub fn function_word(&self, index: usize) -> u32 {
    self.functions[index]
  }

  /// The tagged form of function directory entry `index`.
  pub fn function_entry(&self, index: usize) -> (FunctionEntry, Modifiers) {
    FunctionEntry::unpack(self.functions[index])
  }

  pub fn function_name(&self, index: usize) -> &DefaultAtom {
    &self.function_names[index]
  }

  pub fn variable(&self, index: usize) -> &Variable {
    &self.variables[index]
  }

  pub fn string(&self, index: u16) -> &DefaultAtom {
    &self.strings[index as usize]
  }

  pub fn inherit(&self, index: usize) -> &Inherit {
    &self.inherits[index]
  }

  pub fn inherits(&self) -> &[Inherit] {
    &self.inherits
  }

  /// The function header of an `Own` entry, read back from the code buffer.
  pub fn function_header(&self, index: usize) -> Option<FunHeader> {
    match self.function_entry(index).0 {
      FunctionEntry::Own{ address } if address != flags::UNDEFINED_ADDRESS => {
        Some(FunHeader::read_at(&self.code, address as usize))
      }
      _ => None
    }
  }

  /// The saved argument types of function `index`, when type saving was on
  /// and the function is an own definition.
  pub fn saved_argument_types(&self, index: usize) -> Option<&[u16]> {
    let saved = self.argument_types.as_ref()?;
    let start = *saved.type_start.get(index)?;
    if start == INDEX_START_NONE {
      return None;
    }
    let num_args = self.function_header(index)?.num_args as usize;
    Some(&saved.types[start as usize .. start as usize + num_args])
  }

  // endregion

  // region Line number mapping

  /// Code offset where source line `line` (1-based) begins.
  pub fn offset_of_line(&self, line: u16) -> Option<u16> {
    match line {
      0 => None,
      _ => self.line_numbers.get(line as usize - 1).cloned()
    }
  }

  /// Source line a code offset belongs to, for error reports: the last line
  /// whose starting offset is not past `offset`.
  pub fn line_of_offset(&self, offset: u16) -> Option<u16> {
    let mut found = None;
    for (k, start) in self.line_numbers.iter().enumerate() {
      if *start > offset {
        break;
      }
      found = Some(k as u16 + 1);
    }
    found
  }

  // endregion

  // region Resolution

  /**
    Chases a function directory entry to the program and code address that
    actually hold the function. `CrossDefined` entries hop sideways within
    the same directory; `Inherited` entries descend into the parent
    program's directory at the index the descriptor's offset maps to.

    A tag/payload combination that cannot be followed (an inherit index past
    the table, a delta landing outside the directory) is a corrupted
    flag-word and aborts: continuing would mis-address code shared across
    the inheritance graph.
  */
  pub fn resolve_function(prog: &Rc<Program>, index: usize) -> FunctionLocation {
    let mut prog  = prog.clone();
    let mut index = index;

    loop {
      let (entry, _modifiers) = prog.function_entry(index);
      match entry {

        FunctionEntry::Own{ address } => {
          return FunctionLocation{ prog, index, address };
        }

        FunctionEntry::CrossDefined{ delta } => {
          let target = index as i64 + delta as i64;
          if target < 0 || target >= prog.num_functions() as i64 {
            panic!(
              "corrupt flag-word: cross-definition at {}[{}] points outside the directory",
              prog.name, index
            );
          }
          index = target as usize;
        }

        FunctionEntry::Inherited{ inherit_index } => {
          if inherit_index as usize >= prog.num_inherits() {
            panic!(
              "corrupt flag-word: inherit index {} at {}[{}] points outside the inherit table",
              inherit_index, prog.name, index
            );
          }
          let descriptor = prog.inherit(inherit_index as usize).clone();
          index = index - descriptor.function_index_offset as usize;
          prog  = descriptor.prog;
        }

      }
    }
  }

  /**
    Canonicalizes a variable directory index. If `index` falls inside the
    variable range of a duplicate descriptor (a second or later occurrence
    of a virtually inherited program), the result is the corresponding index
    inside the *first* descriptor referencing the same program; otherwise
    `index` is returned unchanged.

    Performed at every access by design: the duplicate descriptor stores no
    link to its canonical sibling, so the table is scanned for the earliest
    descriptor with the same program identity.
  */
  pub fn canonical_variable(&self, index: usize) -> usize {
    // Ranges nest (a parent's block contains its spliced ancestors), so the
    // innermost containing duplicate is the one whose frame `index` is in.
    let duplicate = self
      .inherits
      .iter()
      .filter(|inh| inh.is_duplicate && inh.contains_variable(index))
      .max_by_key(|inh| inh.variable_index_offset);

    let duplicate = match duplicate {
      Some(inh) => inh,
      None      => return index
    };

    for first in self.inherits.iter() {
      if !first.is_duplicate && first.prog.id_number == duplicate.prog.id_number {
        return first.variable_index_offset as usize
          + (index - duplicate.variable_index_offset as usize);
      }
    }

    panic!(
      "corrupt inherit table: duplicate virtual base \"{}\" has no first instance in \"{}\"",
      duplicate.prog.name, self.name
    );
  }

  // endregion
}

impl Display for Program {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}: {} bytes of code, {} functions, {} variables, {} strings, {} inherits",
      self.name,
      self.code.len(),
      self.num_functions(),
      self.num_variables(),
      self.num_strings(),
      self.num_inherits()
    )
  }
}
