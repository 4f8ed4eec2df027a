use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::error::LinkError;

/**
  The registry building a program's string table. Every string a program uses
  is an interned `DefaultAtom`, so table entries are cheap handles into the
  shared string arena, never owned copies. The registry is really just a
  `BiMap` for deduplication plus a `Vec` to remember insertion order, which
  becomes the table order of the sealed program.
*/
pub struct StringRegistry{
  table : BiMap<DefaultAtom, u16>,
  order : Vec<DefaultAtom>
}

impl StringRegistry{

  pub fn new() -> StringRegistry {
    StringRegistry{
      table : BiMap::new(),
      order : Vec::new()
    }
  }

  /// Interns `text` and returns its string-table index. Interning the same
  /// text twice returns the same index.
  pub fn intern(&mut self, text: &str) -> Result<u16, LinkError>{
    let atom = DefaultAtom::from(text);
    self.intern_atom(atom)
  }

  /// As `intern`, for an already-interned atom.
  pub fn intern_atom(&mut self, atom: DefaultAtom) -> Result<u16, LinkError>{
    match self.table.get_by_left(&atom) {

      Some(index) => Ok(*index),

      None => {
        if self.order.len() >= u16::max_value() as usize {
          return Err(LinkError::TooManyStrings);
        }
        let index = self.order.len() as u16;
        self.table.insert(atom.clone(), index);
        self.order.push(atom);
        Ok(index)
      }

    }
  }

  pub fn index_of(&self, atom: &DefaultAtom) -> Option<u16>{
    self.table.get_by_left(atom).cloned()
  }

  pub fn atom_at(&self, index: u16) -> Option<DefaultAtom>{
    self.table.get_by_right(&index).cloned()
  }

  pub fn len(&self) -> usize{
    self.order.len()
  }

  /// Surrenders the table in insertion order, for sealing into a program.
  pub fn into_table(self) -> Box<[DefaultAtom]>{
    self.order.into_boxed_slice()
  }
}
