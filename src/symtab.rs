/* itsyld global symbol table
 *
 * the append-only table the link driver builds as it walks input files.
 * the resolution policy engine never owns this: it only reads entries
 * and conditionally overwrites them through its callback contract.
 * entries are created when a symbol is first observed and mutated in
 * place afterwards; they are never removed.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use indexmap::map::IndexMap;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind
{
    Undefined,
    Defined,
    Common,
    Indirect
}

/* one table entry. the owning object is the file identifier of whoever
   last supplied the winning definition or first reference */
#[derive(Clone, PartialEq, Debug)]
pub struct Symbol
{
    pub name: String,
    pub kind: SymbolKind,
    pub value: u64,
    pub size: u64,
    pub object: Option<String>,
    pub section: Option<String>
}

pub struct SymbolTable
{
    /* insertion order is observation order, which the cross-reference
       report preserves */
    entries: IndexMap<String, Symbol>
}

impl SymbolTable
{
    pub fn new() -> SymbolTable
    {
        SymbolTable { entries: IndexMap::new() }
    }

    /* record a reference to a symbol nobody has defined yet. harmless
       if the symbol already exists in any state */
    pub fn reference(&mut self, name: &str, object: &str)
    {
        if self.entries.contains_key(name) == false
        {
            self.entries.insert(String::from(name), Symbol
            {
                name: String::from(name),
                kind: SymbolKind::Undefined,
                value: 0,
                size: 0,
                object: Some(String::from(object)),
                section: None
            });
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol>
    {
        self.entries.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol>
    {
        self.entries.get_mut(name)
    }

    /* overwrite or create an entry outright. the policy engine decides
       when this is legitimate; the table just does as it is told */
    pub fn put(&mut self, symbol: Symbol)
    {
        self.entries.insert(symbol.name.clone(), symbol);
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Symbol>
    {
        self.entries.iter()
    }

    /* every name still unresolved, in observation order */
    pub fn undefined(&self) -> Vec<String>
    {
        self.entries.values()
            .filter(|s| s.kind == SymbolKind::Undefined)
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize { self.entries.len() }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn references_never_downgrade_entries()
    {
        let mut table = SymbolTable::new();
        table.put(Symbol
        {
            name: String::from("main"),
            kind: SymbolKind::Defined,
            value: 0x1000,
            size: 64,
            object: Some(String::from("main.o")),
            section: Some(String::from(".text"))
        });

        table.reference("main", "other.o");
        assert_eq!(table.lookup("main").unwrap().kind, SymbolKind::Defined);
        assert_eq!(table.lookup("main").unwrap().object.as_deref(), Some("main.o"));
    }

    #[test]
    fn undefined_listing_keeps_observation_order()
    {
        let mut table = SymbolTable::new();
        table.reference("zeta", "a.o");
        table.reference("alpha", "b.o");

        assert_eq!(table.undefined(), vec![String::from("zeta"), String::from("alpha")]);
    }
}
