/*!
  The blob builder: owns the growable section buffers a compilation fills in
  before the program is linked. The final size of each section is unknown
  while code is generated, so they grow independently here and are moved
  into one sealed, reference counted `Program` at link time.

  Sealing is transactional. Every bound is validated before any section is
  moved, and a failed seal consumes the builder and publishes nothing, so a
  half-built program can never escape into the inheritance graph.
*/

use std::rc::Rc;

use string_cache::DefaultAtom;

use crate::bytecode::cursor::put_u8;
use crate::bytecode::header::FunHeader;
use crate::bytecode::opcode::{emit_branch_operand, emit_opcode};
use crate::error::LinkError;
use crate::strings::StringRegistry;
use super::{ArgumentTypes, Inherit, next_id, Program, Variable, INDEX_START_NONE};

/// Hard limit on the code section: addresses are 16 bit.
pub const MAX_CODE_SIZE: usize = 65535;

pub struct ProgramBuilder {
  code           : Vec<u8>,
  strings        : StringRegistry,
  line_numbers   : Vec<u16>,
  /// Saved argument types per own-function definition index; empty unless
  /// type saving was requested.
  saved_types    : Vec<(usize, Vec<u16>)>
}

impl ProgramBuilder {

  pub fn new() -> ProgramBuilder {
    ProgramBuilder{
      code         : Vec::new(),
      strings      : StringRegistry::new(),
      line_numbers : Vec::new(),
      saved_types  : Vec::new()
    }
  }

  // region Code emission

  pub fn code_size(&self) -> usize {
    self.code.len()
  }

  /// Appends a function header and returns the address the function
  /// directory will store for it.
  pub fn emit_function_header(&mut self, header: &FunHeader) -> usize {
    header.emit(&mut self.code)
  }

  pub fn emit_opcode(&mut self, opcode: u16) -> Result<(), LinkError> {
    emit_opcode(&mut self.code, opcode)
  }

  /// Appends a branch operand targeting the absolute code offset `target`.
  pub fn emit_branch(&mut self, target: usize) -> Result<(), LinkError> {
    emit_branch_operand(&mut self.code, target)
  }

  pub fn emit_byte(&mut self, byte: u8) {
    put_u8(&mut self.code, byte);
  }

  pub fn append_code(&mut self, bytes: &[u8]) {
    self.code.extend_from_slice(bytes);
  }

  // endregion

  // region Side tables

  /// Interns a string and returns its string-table index.
  pub fn intern(&mut self, text: &str) -> Result<u16, LinkError> {
    self.strings.intern(text)
  }

  pub fn intern_atom(&mut self, atom: DefaultAtom) -> Result<u16, LinkError> {
    self.strings.intern_atom(atom)
  }

  /// Records that the next source line starts at the current code offset.
  /// Called once per source line, in order. Offsets saturate at the code
  /// limit; a buffer that large is rejected at seal.
  pub fn begin_line(&mut self) {
    self.line_numbers.push(self.code.len().min(MAX_CODE_SIZE) as u16);
  }

  /**
    Saves the argument types of the own function with definition index
    `own_index` (its position in the function directory). Calling this at
    least once marks the program as compiled with type saving.
  */
  pub fn save_argument_types(&mut self, own_index: usize, types: Vec<u16>) {
    self.saved_types.push((own_index, types));
  }

  // endregion

  /**
    Seals all sections into one immutable program. Called by the linker once
    the directories are flattened; `functions`, `function_names`,
    `variables` and `inherits` are the linker's outputs.
  */
  pub(crate) fn seal(
    self,
    name           : DefaultAtom,
    functions      : Vec<u32>,
    function_names : Vec<DefaultAtom>,
    variables      : Vec<Variable>,
    inherits       : Vec<Inherit>
  ) -> Result<Rc<Program>, LinkError>
  {
    if self.code.len() > MAX_CODE_SIZE {
      return Err(LinkError::CodeTooLarge{ size: self.code.len() });
    }

    let argument_types = self.build_argument_types(functions.len());

    let total_size =
      self.code.len()
      + functions.len() * std::mem::size_of::<u32>()
      + function_names.len() * std::mem::size_of::<DefaultAtom>()
      + self.strings.len() * std::mem::size_of::<DefaultAtom>()
      + variables.len() * std::mem::size_of::<Variable>()
      + inherits.len() * std::mem::size_of::<Inherit>()
      + self.line_numbers.len() * std::mem::size_of::<u16>()
      + argument_types
          .as_ref()
          .map(|t| (t.types.len() + t.type_start.len()) * std::mem::size_of::<u16>())
          .unwrap_or(0);

    Ok(Rc::new(Program{
      name,
      id_number      : next_id(),
      total_size,
      code           : self.code.into_boxed_slice(),
      functions      : functions.into_boxed_slice(),
      function_names : function_names.into_boxed_slice(),
      strings        : self.strings.into_table(),
      variables      : variables.into_boxed_slice(),
      inherits       : inherits.into_boxed_slice(),
      line_numbers   : self.line_numbers.into_boxed_slice(),
      argument_types
    }))
  }

  fn build_argument_types(&self, num_functions: usize) -> Option<ArgumentTypes> {
    if self.saved_types.is_empty() {
      return None;
    }

    let mut types      = Vec::new();
    let mut type_start = vec![INDEX_START_NONE; num_functions];

    for (own_index, function_types) in self.saved_types.iter() {
      type_start[*own_index] = types.len() as u16;
      types.extend_from_slice(function_types);
    }

    Some(ArgumentTypes{
      types      : types.into_boxed_slice(),
      type_start : type_start.into_boxed_slice()
    })
  }
}
