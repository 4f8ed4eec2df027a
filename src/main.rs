#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

mod bytecode;
mod error;
mod program;
mod strings;

use std::rc::Rc;

use prettytable::{format as TableFormat, Table};
use string_cache::DefaultAtom;

use crate::bytecode::FunHeader;
use crate::error::LinkError;
use crate::program::builder::ProgramBuilder;
use crate::program::flags::Modifiers;
use crate::program::linker::{FunctionDef, InheritKind, Linker};
use crate::program::Program;

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

/**
  Compiles a skeletal object: every function gets a header and a one-opcode
  body, and the requested parents are linked in declaration order. Stands in
  for the compiler front end, which hands the linker exactly these inputs.
*/
fn compile_object(
  name      : &str,
  functions : &[&str],
  variables : &[&str],
  parents   : &[(&Rc<Program>, InheritKind)]
) -> Result<Rc<Program>, LinkError>
{
  let mut builder = ProgramBuilder::new();
  let mut linker  = Linker::new(name);

  for (parent, kind) in parents.iter() {
    linker.inherit(*parent, *kind, 1);
  }

  for (line, function) in functions.iter().enumerate() {
    builder.begin_line();
    let string_index = builder.intern(function)?;
    let address = builder.emit_function_header(&FunHeader{
      name        : string_index,
      return_type : 0,
      num_args    : 0,
      varargs     : false,
      num_locals  : 0
    });
    builder.emit_opcode(1)?; // a lone "return" body

    linker.define_function(FunctionDef{
      name      : DefaultAtom::from(*function),
      modifiers : Modifiers::empty(),
      address   : Some(address as u32),
      line      : line as u16 + 1
    });
  }

  for variable in variables {
    linker.define_variable(variable, Modifiers::empty(), 1);
  }

  linker.link(builder)
}

fn function_directory_table(program: &Rc<Program>) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Index", ubl->"Name", ubl->"Entry", ubl->"Resolves To"]);

  for index in 0..program.num_functions() {
    let (entry, _modifiers) = program.function_entry(index);
    let location = Program::resolve_function(program, index);
    table.add_row(row![
      r->format!("{}", index),
      program.function_name(index),
      format!("{}", entry),
      format!("{}[{:#x}]", location.prog.name, location.address)
    ]);
  }
  table
}

fn variable_directory_table(program: &Program) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"Index", ubl->"Name", ubl->"Flags", ubr->"Canonical"]);

  for index in 0..program.num_variables() {
    let variable = program.variable(index);
    table.add_row(row![
      r->format!("{}", index),
      variable.name,
      format!("{}", variable.modifiers()),
      r->format!("{}", program.canonical_variable(index))
    ]);
  }
  table
}

fn inherit_table(program: &Program) -> Table {
  let mut table = Table::new();
  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(
    row![ubr->"Index", ubl->"Program", ubr->"Fn Offset", ubr->"Var Offset", ubl->"Duplicate"]
  );

  for (index, inherit) in program.inherits().iter().enumerate() {
    table.add_row(row![
      r->format!("{}", index),
      inherit.prog.name,
      r->format!("{}", inherit.function_index_offset),
      r->format!("{}", inherit.variable_index_offset),
      format!("{}", inherit.is_duplicate)
    ]);
  }
  table
}

/// Links the classic diamond: `c` and `d` virtually inherit `a`, and `e`
/// inherits both, so `a`'s variables get exactly one canonical region.
fn link_diamond() -> Result<(), LinkError> {
  let a = compile_object("obj/a", &["query_hp"], &["hp", "max_hp"], &[])?;
  let c = compile_object("obj/c", &["heal"], &["potion"], &[(&a, InheritKind::Virtual)])?;
  let d = compile_object("obj/d", &["harm"], &["weapon"], &[(&a, InheritKind::Virtual)])?;
  let e = compile_object(
    "obj/e",
    &["create"],
    &[],
    &[(&c, InheritKind::Normal), (&d, InheritKind::Normal)]
  )?;

  for program in [&a, &c, &d, &e].iter() {
    println!("{}", program);
  }

  println!("\nFunction directory of {}:", e.name);
  function_directory_table(&e).printstd();

  println!("\nVariable directory of {}:", e.name);
  variable_directory_table(&e).printstd();

  println!("\nInherit table of {}:", e.name);
  inherit_table(&e).printstd();

  Ok(())
}

fn main() {
  if let Err(error) = link_diamond() {
    eprintln!("link failed: {}", error);
    std::process::exit(1);
  }
}
