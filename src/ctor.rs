/* itsyld constructor and destructor set collection
 *
 * every constructor or destructor contribution, whether flagged by a
 * set-style relocation or recognized from a format with no native set
 * support, is appended in encounter order to one of two well-known set
 * symbols. the CONSTRUCTORS statement in a script later expands to the
 * collected lists. if set building is disabled the contribution is
 * dropped, with at most one warning for the whole run.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::diag::Diagnostics;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SetKind
{
    Constructor,
    Destructor
}

/* the well-known set symbol base names; the emulation's symbol prefix
   convention is applied on top */
const CTOR_SET_NAME: &str = "__CTOR_LIST__";
const DTOR_SET_NAME: &str = "__DTOR_LIST__";

/* mangle a set symbol per the target's prefix convention */
pub fn set_symbol_name(kind: SetKind, prefix: Option<char>) -> String
{
    let base = match kind
    {
        SetKind::Constructor => CTOR_SET_NAME,
        SetKind::Destructor => DTOR_SET_NAME
    };

    match prefix
    {
        Some(c) => format!("{}{}", c, base),
        None => String::from(base)
    }
}

/* one contribution to a set */
#[derive(Clone, PartialEq, Debug)]
pub struct SetEntry
{
    pub symbol: String,
    pub object: String,
    pub section: String
}

pub struct ConstructorSets
{
    build: bool,
    warn_dropped: bool,
    warned: bool,
    ctors: Vec<SetEntry>,
    dtors: Vec<SetEntry>
}

impl ConstructorSets
{
    pub fn new(build: bool, warn_dropped: bool) -> ConstructorSets
    {
        ConstructorSets
        {
            build,
            warn_dropped,
            warned: false,
            ctors: Vec::new(),
            dtors: Vec::new()
        }
    }

    /* append a contribution in encounter order, or drop it if set
       building is disabled */
    pub fn add(&mut self, kind: SetKind, entry: SetEntry, diag: &mut Diagnostics)
    {
        if self.build == false
        {
            if self.warn_dropped && self.warned == false
            {
                diag.warning(format!("global constructor {} in {} ignored: set building is disabled",
                                     entry.symbol, entry.object));
                self.warned = true;
            }
            return;
        }

        match kind
        {
            SetKind::Constructor => self.ctors.push(entry),
            SetKind::Destructor => self.dtors.push(entry)
        }
    }

    pub fn constructors(&self) -> &[SetEntry] { &self.ctors }
    pub fn destructors(&self) -> &[SetEntry] { &self.dtors }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn entry(symbol: &str, object: &str) -> SetEntry
    {
        SetEntry
        {
            symbol: String::from(symbol),
            object: String::from(object),
            section: String::from(".ctors")
        }
    }

    #[test]
    fn contributions_keep_encounter_order()
    {
        let mut diag = Diagnostics::new();
        diag.silence();
        let mut sets = ConstructorSets::new(true, false);

        sets.add(SetKind::Constructor, entry("init_b", "b.o"), &mut diag);
        sets.add(SetKind::Constructor, entry("init_a", "a.o"), &mut diag);
        sets.add(SetKind::Destructor, entry("fini_a", "a.o"), &mut diag);

        let order: Vec<&str> = sets.constructors().iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(order, vec!["init_b", "init_a"]);
        assert_eq!(sets.destructors().len(), 1);
    }

    #[test]
    fn disabled_sets_drop_with_one_warning()
    {
        let mut diag = Diagnostics::new();
        diag.silence();
        let mut sets = ConstructorSets::new(false, true);

        sets.add(SetKind::Constructor, entry("init_a", "a.o"), &mut diag);
        sets.add(SetKind::Constructor, entry("init_b", "b.o"), &mut diag);

        assert!(sets.constructors().is_empty());
        assert_eq!(diag.count(super::super::diag::Severity::Warning), 1);
        assert!(diag.has_fatal() == false);
    }

    #[test]
    fn set_symbols_respect_prefix_convention()
    {
        assert_eq!(set_symbol_name(SetKind::Constructor, None), "__CTOR_LIST__");
        assert_eq!(set_symbol_name(SetKind::Destructor, Some('_')), "___DTOR_LIST__");
    }
}
