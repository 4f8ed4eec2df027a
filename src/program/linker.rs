/*!

  The inheritance linker: flattens a program's own definitions and the
  directories of its already-compiled parents into the contiguous function
  and variable directories the runtime indexes into.

  The layout follows the block structure of the binary format. Own
  definitions come first, then one block per inherited parent in declaration
  order. A parent's block is its *entire* directory copied and re-tagged,
  with the parent's own inherit descriptors spliced in directly beneath the
  new descriptor, so for `D` inheriting `C` (which inherits `A`) and `B` the
  tables come out as:

  ```text
  D-fblock: D-funs (C-desc A-desc) B-desc
  D-vblock: D-vars  C-vars A-vars  B-vars
  ```

  Virtual inheritance deduplicates storage: the first occurrence of a
  virtual base owns the canonical variable slots, every later occurrence
  gets a descriptor marked `is_duplicate` whose slots are placeholders (see
  `Program::canonical_variable`). Function name collisions across blocks are
  resolved by rewriting the shadowed slot as a cross-definition aliasing the
  authoritative one.

*/

use std::collections::HashMap;
use std::rc::Rc;

use string_cache::DefaultAtom;

use crate::error::{LineNumber, LinkError};
use super::builder::{ProgramBuilder, MAX_CODE_SIZE};
use super::flags::{FunctionEntry, Modifiers, UNDEFINED_ADDRESS};
use super::{Inherit, Program, Variable};

#[cfg(feature = "trace_linking")]
macro_rules! trace {
  ($($arg:tt)*) => { println!($($arg)*) }
}

#[cfg(not(feature = "trace_linking"))]
macro_rules! trace {
  ($($arg:tt)*) => {{}}
}

/// Hard limit on the inherit table: indices must fit the 18 bit flag-word
/// field.
pub const MAX_INHERITS: usize = 1 << 18;

const MAX_DIRECTORY: usize = 65535;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum InheritKind {
  Normal,
  Virtual
}

/// One own function the compiler hands to the linker. `address` is `None`
/// for a function that was called or prototyped but never defined; such an
/// entry links against a definition supplied by an inherited program, or
/// stays undefined.
#[derive(Clone, Debug)]
pub struct FunctionDef {
  pub name      : DefaultAtom,
  pub modifiers : Modifiers,
  pub address   : Option<u32>,
  pub line      : LineNumber
}

struct VariableDef {
  name      : DefaultAtom,
  modifiers : Modifiers,
  line      : LineNumber
}

struct InheritDecl {
  prog       : Rc<Program>,
  kind       : InheritKind,
  /// Explicit visibility modifiers on the inherit declaration itself, if
  /// any. OR'ed onto every entry copied from the parent; conflicting
  /// explicit visibility on two paths to one virtual base is an error.
  visibility : Option<Modifiers>,
  /// Name prefix of a renamed inherit. Copied functions are reachable as
  /// `prefix::name` instead of their bare names.
  prefix     : Option<DefaultAtom>,
  line       : LineNumber
}

/// A function directory entry while the directory is still mutable.
struct LinkedFunction {
  name      : DefaultAtom,
  entry     : FunctionEntry,
  modifiers : Modifiers
}

/**
  Collects one program's own definitions and inherit declarations, then
  flattens everything into sealed directories with `link`. The linker is
  single use: one compilation, one `link` call, one program.
*/
pub struct Linker {
  name          : DefaultAtom,
  own_functions : Vec<FunctionDef>,
  own_variables : Vec<VariableDef>,
  inherit_decls : Vec<InheritDecl>
}

impl Linker {

  pub fn new(name: &str) -> Linker {
    Linker{
      name          : DefaultAtom::from(name),
      own_functions : Vec::new(),
      own_variables : Vec::new(),
      inherit_decls : Vec::new()
    }
  }

  pub fn define_function(&mut self, def: FunctionDef) {
    self.own_functions.push(def);
  }

  pub fn define_variable(&mut self, name: &str, modifiers: Modifiers, line: LineNumber) {
    self.own_variables.push(VariableDef{
      name: DefaultAtom::from(name),
      modifiers,
      line
    });
  }

  pub fn inherit(&mut self, prog: &Rc<Program>, kind: InheritKind, line: LineNumber) {
    self.inherit_qualified(prog, kind, None, None, line);
  }

  pub fn inherit_with_visibility(
    &mut self,
    prog       : &Rc<Program>,
    kind       : InheritKind,
    visibility : Option<Modifiers>,
    line       : LineNumber
  ){
    self.inherit_qualified(prog, kind, visibility, None, line);
  }

  /// A renamed inherit: the parent's functions link under `prefix::name`,
  /// leaving the bare names free for the inheriting program.
  pub fn inherit_renamed(
    &mut self,
    prog   : &Rc<Program>,
    kind   : InheritKind,
    prefix : &str,
    line   : LineNumber
  ){
    self.inherit_qualified(prog, kind, None, Some(DefaultAtom::from(prefix)), line);
  }

  pub fn inherit_qualified(
    &mut self,
    prog       : &Rc<Program>,
    kind       : InheritKind,
    visibility : Option<Modifiers>,
    prefix     : Option<DefaultAtom>,
    line       : LineNumber
  ){
    self.inherit_decls.push(InheritDecl{
      prog: prog.clone(),
      kind,
      visibility,
      prefix,
      line
    });
  }

  /**
    Runs the flattening algorithm and seals the result together with the
    builder's code and side tables. On any error the in-progress directories
    and the builder's buffers are dropped; nothing is published.
  */
  pub fn link(self, sections: ProgramBuilder) -> Result<Rc<Program>, LinkError> {
    let mut state = LinkState{
      functions    : Vec::new(),
      variables    : Vec::new(),
      inherits     : Vec::new(),
      is_virtual   : Vec::new(),
      visibility   : Vec::new(),
      by_name      : HashMap::new()
    };

    state.emit_own_functions(&self.own_functions, sections.code_size())?;
    state.emit_own_variables(&self.own_variables)?;

    for decl in self.inherit_decls.iter() {
      state.inherit_block(decl)?;
    }

    let mut functions      = Vec::with_capacity(state.functions.len());
    let mut function_names = Vec::with_capacity(state.functions.len());
    for function in state.functions.into_iter() {
      functions.push(function.entry.pack(function.modifiers)?);
      function_names.push(function.name);
    }

    sections.seal(self.name, functions, function_names, state.variables, state.inherits)
  }
}

/// The mutable working set of one `link` run.
struct LinkState {
  functions  : Vec<LinkedFunction>,
  variables  : Vec<Variable>,
  inherits   : Vec<Inherit>,
  /// Per descriptor: does it reference a virtually inherited program?
  /// Transient knowledge; the sealed descriptor only keeps `is_duplicate`.
  is_virtual : Vec<bool>,
  /// Per descriptor: the explicit visibility of its inherit declaration,
  /// `None` for spliced descriptors.
  visibility : Vec<Option<Modifiers>>,
  /// Authoritative directory index per visible function name.
  by_name    : HashMap<DefaultAtom, usize>
}

impl LinkState {

  // region Own definitions

  fn emit_own_functions(
    &mut self,
    defs      : &[FunctionDef],
    code_size : usize
  ) -> Result<(), LinkError>
  {
    for def in defs.iter() {
      if let Some(address) = def.address {
        if address as usize > MAX_CODE_SIZE || address as usize >= code_size {
          return Err(LinkError::AddressOutOfRange{ address });
        }
      }

      // A prototype and its later definition share one slot.
      if let Some(existing) = self.by_name.get(&def.name).cloned() {
        let filled = !self.functions[existing].entry.is_undefined();
        match (def.address, filled) {

          (Some(address), false) => {
            trace!("own function {} fills prototype slot {}", def.name, existing);
            self.functions[existing].entry      = FunctionEntry::Own{ address };
            self.functions[existing].modifiers |= def.modifiers;
          }

          // Redefinition of a defined own function: the front end rejects
          // this; if one slips through, the later address wins.
          (Some(address), true) => {
            self.functions[existing].entry = FunctionEntry::Own{ address };
          }

          // A repeated reference records nothing new.
          (None, _) => {}

        }
        continue;
      }

      if self.functions.len() >= MAX_DIRECTORY {
        return Err(LinkError::TooManyFunctions{ line: def.line });
      }

      let entry = match def.address {
        Some(address) => FunctionEntry::Own{ address },
        None          => FunctionEntry::Own{ address: UNDEFINED_ADDRESS }
      };

      trace!("own function {} at directory index {}", def.name, self.functions.len());
      self.by_name.insert(def.name.clone(), self.functions.len());
      self.functions.push(LinkedFunction{
        name      : def.name.clone(),
        entry,
        modifiers : def.modifiers
      });
    }
    Ok(())
  }

  fn emit_own_variables(&mut self, defs: &[VariableDef]) -> Result<(), LinkError> {
    for def in defs.iter() {
      if self.variables.len() >= MAX_DIRECTORY {
        return Err(LinkError::TooManyVariables{ line: def.line });
      }
      self.variables.push(Variable{
        name  : def.name.clone(),
        flags : def.modifiers.bits()
      });
    }
    Ok(())
  }

  // endregion

  // region Inherited blocks

  /**
    Appends one parent's block: the descriptor (plus the parent's own
    descriptors, spliced), the re-tagged copies of the parent's function
    directory, and the copies of its variable directory.
  */
  fn inherit_block(&mut self, decl: &InheritDecl) -> Result<(), LinkError> {
    let parent  = &decl.prog;
    let fun_off = self.functions.len();
    let var_off = self.variables.len();

    if fun_off + parent.num_functions() > MAX_DIRECTORY {
      return Err(LinkError::TooManyFunctions{ line: decl.line });
    }
    if var_off + parent.num_variables() > MAX_DIRECTORY {
      return Err(LinkError::TooManyVariables{ line: decl.line });
    }
    if self.inherits.len() + 1 + parent.num_inherits() > MAX_INHERITS {
      return Err(LinkError::TooManyInherits{ line: decl.line });
    }

    // A second-or-later virtual occurrence of the same program only gets
    // placeholder slots.
    let first_virtual = match decl.kind {
      InheritKind::Virtual => self.first_virtual_occurrence(parent.id_number),
      InheritKind::Normal  => None
    };
    if let Some(first) = first_virtual {
      match (self.visibility[first], decl.visibility) {
        (Some(earlier), Some(here)) if earlier != here => {
          return Err(LinkError::AmbiguousVirtualBase{
            name: parent.name.to_string(),
            line: decl.line
          });
        }
        _ => {}
      }
    }
    let duplicate = first_virtual.is_some();

    let top_index = self.inherits.len();
    trace!(
      "inherit block for {}: descriptor {} at offsets f={} v={}{}",
      parent.name, top_index, fun_off, var_off,
      if duplicate { " (duplicate)" } else { "" }
    );

    self.inherits.push(Inherit{
      prog                  : parent.clone(),
      function_index_offset : fun_off as u16,
      variable_index_offset : var_off as u16,
      is_duplicate          : duplicate
    });
    self.is_virtual.push(decl.kind == InheritKind::Virtual);
    self.visibility.push(decl.visibility);

    // Splice the parent's own inherit table beneath the new descriptor, so
    // entries pointing further up the chain keep resolving.
    for spliced in parent.inherits().iter() {
      let virtual_edge = spliced.is_duplicate || descriptor_is_virtual(parent, spliced);
      let spliced_duplicate =
        duplicate
        || spliced.is_duplicate
        || (virtual_edge
            && self.first_virtual_occurrence_before(top_index, spliced.prog.id_number).is_some());

      self.inherits.push(Inherit{
        prog                  : spliced.prog.clone(),
        function_index_offset : (fun_off + spliced.function_index_offset as usize) as u16,
        variable_index_offset : (var_off + spliced.variable_index_offset as usize) as u16,
        is_duplicate          : spliced_duplicate
      });
      self.is_virtual.push(virtual_edge);
      self.visibility.push(None);
    }

    self.copy_functions(parent, top_index, decl);
    self.copy_variables(parent, decl);

    // Collisions are resolved after the whole block is in place, so chasing
    // an entry for definedness can already follow the spliced descriptors.
    for index in fun_off..self.functions.len() {
      self.resolve_collision(index);
    }

    Ok(())
  }

  /// Re-tags and appends every entry of the parent's function directory.
  /// An explicit visibility override on the declaration is OR'ed onto every
  /// copied entry; a rename prefixes every copied name.
  fn copy_functions(&mut self, parent: &Rc<Program>, top_index: usize, decl: &InheritDecl) {
    for pi in 0..parent.num_functions() {
      let (entry, mut modifiers) = parent.function_entry(pi);
      if let Some(visibility) = decl.visibility {
        modifiers |= visibility;
      }

      let entry = match entry {
        // The code lives in (or below) the parent: point at the new
        // descriptor and let resolution descend.
        FunctionEntry::Own{ .. } => {
          FunctionEntry::Inherited{ inherit_index: top_index as u32 }
        }
        // Already inherited in the parent: keep pointing up the chain
        // through the descriptor spliced in at the matching position.
        FunctionEntry::Inherited{ inherit_index } => {
          FunctionEntry::Inherited{
            inherit_index: (top_index + 1) as u32 + inherit_index
          }
        }
        // A sibling offset shifts with the block; nothing to adjust.
        FunctionEntry::CrossDefined{ delta } => {
          FunctionEntry::CrossDefined{ delta }
        }
      };

      let name = match &decl.prefix {
        Some(prefix) => {
          DefaultAtom::from(format!("{}::{}", prefix, parent.function_name(pi)).as_str())
        }
        None => parent.function_name(pi).clone()
      };

      self.functions.push(LinkedFunction{ name, entry, modifiers });
    }
  }

  /// Copies the parent's variable directory. A virtual inherit marks every
  /// copied slot virtual, so later occurrences can be recognized as aliases;
  /// an explicit visibility override lands on the copied flags too.
  fn copy_variables(&mut self, parent: &Rc<Program>, decl: &InheritDecl) {
    let visibility = decl.visibility.map(|m| m.bits()).unwrap_or(0);
    for pi in 0..parent.num_variables() {
      let variable = parent.variable(pi);
      let flags = match decl.kind {
        InheritKind::Virtual => variable.flags | Modifiers::VIRTUAL.bits(),
        InheritKind::Normal  => variable.flags
      };
      self.variables.push(Variable{
        name  : variable.name.clone(),
        flags : flags | visibility
      });
    }
  }

  // endregion

  // region Name resolution

  /// Index of the earliest descriptor referencing `id` through a virtual
  /// edge, if any.
  fn first_virtual_occurrence(&self, id: i32) -> Option<usize> {
    self.first_virtual_occurrence_before(self.inherits.len(), id)
  }

  fn first_virtual_occurrence_before(&self, end: usize, id: i32) -> Option<usize> {
    (0..end).find(|k| self.is_virtual[*k] && self.inherits[*k].prog.id_number == id)
  }

  /**
    Resolves a name collision for the entry at `index`. The earlier
    occurrence of a name is authoritative; the later one is rewritten as a
    cross-definition aliasing it. Two exceptions: an undefined slot always
    yields to a defined one, and a pair of explicitly virtual definitions
    lets the later redefinition win. Private entries are invisible to name
    resolution altogether.
  */
  fn resolve_collision(&mut self, index: usize) {
    if self.functions[index].modifiers.contains(Modifiers::PRIVATE) {
      return;
    }

    let name = self.functions[index].name.clone();
    let earlier = match self.by_name.get(&name).cloned() {
      None => {
        self.by_name.insert(name, index);
        return;
      }
      Some(earlier) if earlier == index => return,
      Some(earlier) => earlier
    };

    let earlier_defined = !self.entry_is_undefined(earlier);
    let here_defined    = !self.entry_is_undefined(index);

    let later_wins = match (earlier_defined, here_defined) {
      (false, true) => true,
      (true, true)  =>
        self.functions[earlier].modifiers.contains(Modifiers::VIRTUAL)
          && self.functions[index].modifiers.contains(Modifiers::VIRTUAL),
      _             => false
    };

    if later_wins {
      trace!(
        "cross-defining {}[{}] -> [{}] (redefinition)",
        name, earlier, index
      );
      self.functions[earlier].entry =
        FunctionEntry::CrossDefined{ delta: index as i32 - earlier as i32 };
      self.by_name.insert(name, index);
    }
    else {
      trace!("cross-defining {}[{}] -> [{}]", name, index, earlier);
      self.functions[index].entry =
        FunctionEntry::CrossDefined{ delta: earlier as i32 - index as i32 };
    }
  }

  /// Chases an entry in the working directory to decide whether it reaches
  /// a real definition or an undefined slot.
  fn entry_is_undefined(&self, index: usize) -> bool {
    let mut index = index;
    loop {
      match self.functions[index].entry {

        FunctionEntry::Own{ address } => {
          return address == UNDEFINED_ADDRESS;
        }

        FunctionEntry::CrossDefined{ delta } => {
          index = (index as i64 + delta as i64) as usize;
        }

        FunctionEntry::Inherited{ inherit_index } => {
          let descriptor = &self.inherits[inherit_index as usize];
          let location = Program::resolve_function(
            &descriptor.prog,
            index - descriptor.function_index_offset as usize
          );
          return location.address == UNDEFINED_ADDRESS;
        }

      }
    }
  }

  // endregion
}

/// Does `descriptor` (owned by the sealed `owner`) reference a virtually
/// inherited program? The sealed format keeps no virtual flag on the
/// descriptor itself; the mark lives on the copied variables.
fn descriptor_is_virtual(owner: &Program, descriptor: &Inherit) -> bool {
  if descriptor.prog.num_variables() == 0 {
    return false;
  }
  owner
    .variable(descriptor.variable_index_offset as usize)
    .is_virtual()
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::FunHeader;

  /// A small stand-in for the compiler front end: emits skeletal function
  /// bodies into a builder and records the matching linker inputs.
  struct Source {
    linker  : Linker,
    builder : ProgramBuilder
  }

  impl Source {

    fn new(name: &str) -> Source {
      Source{
        linker  : Linker::new(name),
        builder : ProgramBuilder::new()
      }
    }

    fn function(&mut self, name: &str) {
      self.function_with(name, Modifiers::empty());
    }

    fn function_with(&mut self, name: &str, modifiers: Modifiers) {
      self.builder.begin_line();
      let string_index = self.builder.intern(name).unwrap();
      let address = self.builder.emit_function_header(&FunHeader{
        name        : string_index,
        return_type : 0,
        num_args    : 0,
        varargs     : false,
        num_locals  : 0
      });
      self.builder.emit_opcode(1).unwrap();

      self.linker.define_function(FunctionDef{
        name    : DefaultAtom::from(name),
        modifiers,
        address : Some(address as u32),
        line    : 1
      });
    }

    /// A call or prototype without a definition.
    fn reference(&mut self, name: &str) {
      self.linker.define_function(FunctionDef{
        name      : DefaultAtom::from(name),
        modifiers : Modifiers::empty(),
        address   : None,
        line      : 1
      });
    }

    fn variable(&mut self, name: &str) {
      self.linker.define_variable(name, Modifiers::empty(), 1);
    }

    fn inherit(&mut self, prog: &Rc<Program>, kind: InheritKind) {
      self.linker.inherit(prog, kind, 1);
    }

    fn link(self) -> Rc<Program> {
      self.linker.link(self.builder).unwrap()
    }
  }

  fn leaf_with_functions_and_variables(
    name      : &str,
    functions : &[&str],
    variables : &[&str]
  ) -> Rc<Program>
  {
    let mut source = Source::new(name);
    for f in functions {
      source.function(f);
    }
    for v in variables {
      source.variable(v);
    }
    source.link()
  }

  #[test]
  fn program_without_inheritance_has_only_own_entries() {
    let program =
      leaf_with_functions_and_variables("room", &["f", "g", "h"], &["x", "y"]);

    assert_eq!(program.num_functions(), 3);
    assert_eq!(program.num_variables(), 2);
    assert_eq!(program.num_inherits(), 0);

    for index in 0..3 {
      match program.function_entry(index).0 {
        FunctionEntry::Own{ .. } => {}
        other => panic!("expected an own entry, found {}", other)
      }
    }

    // Directory order follows declaration order, and the header in the code
    // buffer agrees with the directory.
    assert_eq!(&**program.function_name(1), "g");
    let header = program.function_header(1).unwrap();
    assert_eq!(&**program.string(header.name), "g");
  }

  #[test]
  fn inherited_entries_resolve_into_the_parent() {
    let parent = leaf_with_functions_and_variables("parent", &["f"], &["v"]);

    let mut child = Source::new("child");
    child.function("own_fun");
    child.inherit(&parent, InheritKind::Normal);
    let child = child.link();

    assert_eq!(child.num_functions(), 2);
    assert_eq!(child.num_inherits(), 1);
    assert_eq!(child.inherit(0).function_index_offset, 1);
    assert_eq!(child.inherit(0).variable_index_offset, 0);

    let location = Program::resolve_function(&child, 1);
    assert_eq!(location.prog.id_number, parent.id_number);

    let direct = Program::resolve_function(&parent, 0);
    assert_eq!(location.address, direct.address);
  }

  #[test]
  fn cross_definition_aliases_the_sibling_definition() {
    // A defines f; B only calls it; C inherits both. B's slot in C must
    // alias A's definition through a cross-defined entry.
    let a = leaf_with_functions_and_variables("a", &["f"], &[]);

    let mut b = Source::new("b");
    b.reference("f");
    let b = b.link();
    assert!(b.function_entry(0).0.is_undefined());

    let mut c = Source::new("c");
    c.inherit(&a, InheritKind::Normal);
    c.inherit(&b, InheritKind::Normal);
    let c = c.link();

    match c.function_entry(1).0 {
      FunctionEntry::CrossDefined{ delta } => assert_eq!(delta, -1),
      other => panic!("expected a cross-defined entry, found {}", other)
    }

    let through_a = Program::resolve_function(&c, 0);
    let through_b = Program::resolve_function(&c, 1);
    assert_eq!(through_a.address, through_b.address);
    assert_eq!(through_a.prog.id_number, a.id_number);
    assert_eq!(through_b.prog.id_number, a.id_number);
  }

  #[test]
  fn own_definition_shadows_the_inherited_one() {
    let parent = leaf_with_functions_and_variables("parent", &["f"], &[]);

    let mut child = Source::new("child");
    child.function("f");
    child.inherit(&parent, InheritKind::Normal);
    let child = child.link();

    // The shadowed inherited slot stays a valid alias of the own entry.
    match child.function_entry(1).0 {
      FunctionEntry::CrossDefined{ delta } => assert_eq!(delta, -1),
      other => panic!("expected a cross-defined entry, found {}", other)
    }
    let resolved = Program::resolve_function(&child, 1);
    assert_eq!(resolved.prog.id_number, child.id_number);
    assert_eq!(resolved.index, 0);
  }

  #[test]
  fn prototype_is_filled_by_the_later_definition() {
    let mut source = Source::new("proto");
    source.reference("f");
    source.function("f");
    let program = source.link();

    assert_eq!(program.num_functions(), 1);
    assert!(!program.function_entry(0).0.is_undefined());
  }

  #[test]
  fn dangling_prototype_stays_undefined() {
    let mut source = Source::new("dangling");
    source.reference("ghost");
    let program = source.link();

    assert!(program.function_entry(0).0.is_undefined());
  }

  #[test]
  fn virtual_inherit_marks_copied_variables() {
    let a = leaf_with_functions_and_variables("a", &[], &["hp", "mana"]);

    let mut c = Source::new("c");
    c.variable("own_var");
    c.inherit(&a, InheritKind::Virtual);
    let c = c.link();

    assert!(!c.variable(0).is_virtual());
    assert!(c.variable(1).is_virtual());
    assert!(c.variable(2).is_virtual());
    assert_eq!(&*c.variable(1).name, "hp");
  }

  /// The diamond: C and D both virtually inherit A; E inherits C and D.
  fn diamond() -> (Rc<Program>, Rc<Program>) {
    let a = leaf_with_functions_and_variables("a", &["a_fun"], &["a1", "a2"]);

    let mut c = Source::new("c");
    c.function("c_fun");
    c.variable("c1");
    c.inherit(&a, InheritKind::Virtual);
    let c = c.link();

    let mut d = Source::new("d");
    d.function("d_fun");
    d.variable("d1");
    d.inherit(&a, InheritKind::Virtual);
    let d = d.link();

    let mut e = Source::new("e");
    e.inherit(&c, InheritKind::Normal);
    e.inherit(&d, InheritKind::Normal);
    (a, e.link())
  }

  #[test]
  fn diamond_keeps_one_canonical_virtual_base() {
    let (a, e) = diamond();

    // C-desc, spliced A-desc, D-desc, spliced duplicate A-desc.
    assert_eq!(e.num_inherits(), 4);

    let canonical_descriptors = e
      .inherits()
      .iter()
      .filter(|inh| inh.prog.id_number == a.id_number && !inh.is_duplicate)
      .count();
    assert_eq!(canonical_descriptors, 1);
    assert!(e.inherit(3).is_duplicate);

    // Variable block: c1 a1 a2 d1 a1 a2 — the second A region is aliased
    // onto the first, everything else maps to itself.
    assert_eq!(e.num_variables(), 6);
    for index in 0..4 {
      assert_eq!(e.canonical_variable(index), index);
    }
    assert_eq!(e.canonical_variable(4), 1);
    assert_eq!(e.canonical_variable(5), 2);
  }

  #[test]
  fn diamond_function_copies_resolve_to_one_address() {
    let (a, e) = diamond();

    // c_fun a_fun d_fun a_fun
    assert_eq!(e.num_functions(), 4);
    let first  = Program::resolve_function(&e, 1);
    let second = Program::resolve_function(&e, 3);

    assert_eq!(first.prog.id_number, a.id_number);
    assert_eq!(second.prog.id_number, a.id_number);
    assert_eq!(first.address, second.address);
  }

  #[test]
  fn direct_virtual_reinherit_is_recognized_as_duplicate() {
    let a = leaf_with_functions_and_variables("a", &[], &["x"]);

    let mut c = Source::new("c");
    c.inherit(&a, InheritKind::Virtual);
    let c = c.link();

    // E inherits C (bringing a first, spliced A) and then virtually
    // inherits A itself: the direct inherit is the duplicate.
    let mut e = Source::new("e");
    e.inherit(&c, InheritKind::Normal);
    e.inherit(&a, InheritKind::Virtual);
    let e = e.link();

    assert_eq!(e.num_inherits(), 3);
    assert!(!e.inherit(1).is_duplicate);
    assert!(e.inherit(2).is_duplicate);
    assert_eq!(e.canonical_variable(1), 0);
  }

  #[test]
  fn visibility_override_lands_on_every_copied_entry() {
    let parent = leaf_with_functions_and_variables("parent", &["f"], &["v"]);

    let mut child = Source::new("child");
    child.function("f");
    child.linker.inherit_with_visibility(
      &parent,
      InheritKind::Normal,
      Some(Modifiers::PRIVATE),
      1
    );
    let child = child.link();

    // The copied function and variable both carry the override.
    assert!(child.function_entry(1).1.contains(Modifiers::PRIVATE));
    assert!(child.variable(0).modifiers().contains(Modifiers::PRIVATE));
    // Parent directories are untouched.
    assert!(!parent.function_entry(0).1.contains(Modifiers::PRIVATE));

    // A privately inherited entry is invisible to name resolution: the
    // copied `f` keeps its inherit link instead of being rewritten as a
    // cross-definition of the own `f`.
    match child.function_entry(1).0 {
      FunctionEntry::Inherited{ .. } => {}
      other => panic!("expected an inherited entry, found {}", other)
    }
  }

  #[test]
  fn renamed_inherit_prefixes_the_copied_names() {
    let parent = leaf_with_functions_and_variables("parent", &["f"], &[]);

    let mut child = Source::new("child");
    child.function("f");
    child.linker.inherit_renamed(&parent, InheritKind::Normal, "base", 1);
    let child = child.link();

    assert_eq!(&**child.function_name(0), "f");
    assert_eq!(&**child.function_name(1), "base::f");

    // The prefixed copy does not collide with the bare own name, so both
    // slots keep their own entries and addresses.
    match child.function_entry(1).0 {
      FunctionEntry::Inherited{ .. } => {}
      other => panic!("expected an inherited entry, found {}", other)
    }
    let own      = Program::resolve_function(&child, 0);
    let prefixed = Program::resolve_function(&child, 1);
    assert_eq!(own.prog.id_number, child.id_number);
    assert_eq!(prefixed.prog.id_number, parent.id_number);
  }

  #[test]
  fn conflicting_visibility_on_a_virtual_base_is_ambiguous() {
    let a = leaf_with_functions_and_variables("a", &[], &["x"]);

    let mut e = Linker::new("e");
    e.inherit_with_visibility(&a, InheritKind::Virtual, Some(Modifiers::PRIVATE), 3);
    e.inherit_with_visibility(&a, InheritKind::Virtual, Some(Modifiers::PUBLIC), 4);

    let result = e.link(ProgramBuilder::new());
    assert_eq!(
      result.err(),
      Some(LinkError::AmbiguousVirtualBase{ name: "a".to_string(), line: 4 })
    );
  }

  #[test]
  fn matching_visibility_on_a_virtual_base_links() {
    let a = leaf_with_functions_and_variables("a", &[], &["x"]);

    let mut e = Linker::new("e");
    e.inherit_with_visibility(&a, InheritKind::Virtual, Some(Modifiers::PRIVATE), 3);
    e.inherit_with_visibility(&a, InheritKind::Virtual, Some(Modifiers::PRIVATE), 4);

    let program = e.link(ProgramBuilder::new()).unwrap();
    assert!(program.inherit(1).is_duplicate);
  }

  #[test]
  fn linking_identical_inputs_is_idempotent() {
    let a = leaf_with_functions_and_variables("a", &["a_fun"], &["a1"]);

    let build = || {
      let mut e = Source::new("e");
      e.function("e_fun");
      e.variable("e1");
      e.inherit(&a, InheritKind::Virtual);
      e.inherit(&a, InheritKind::Virtual);
      e.link()
    };

    let first  = build();
    let second = build();

    assert_eq!(first.functions, second.functions);
    assert_eq!(first.function_names, second.function_names);
    assert_eq!(first.variables, second.variables);
    assert_eq!(first.num_inherits(), second.num_inherits());
    for (x, y) in first.inherits().iter().zip(second.inherits().iter()) {
      assert_eq!(x.prog.id_number, y.prog.id_number);
      assert_eq!(x.function_index_offset, y.function_index_offset);
      assert_eq!(x.variable_index_offset, y.variable_index_offset);
      assert_eq!(x.is_duplicate, y.is_duplicate);
    }
  }

  #[test]
  fn function_directory_overflow_is_reported() {
    let mut linker = Linker::new("crowded");
    for i in 0..=65535usize {
      linker.define_function(FunctionDef{
        name      : DefaultAtom::from(format!("f{}", i).as_str()),
        modifiers : Modifiers::empty(),
        address   : None,
        line      : 7
      });
    }

    let result = linker.link(ProgramBuilder::new());
    assert_eq!(result.err(), Some(LinkError::TooManyFunctions{ line: 7 }));
  }
}


