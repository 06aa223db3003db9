/* itsyld resolution policy engine
 *
 * the decisions made while the link driver walks input files and the
 * global symbol table fills up: which archive members get pulled, who
 * wins when definitions collide, how commons merge, and how undefined
 * references are reported. the engine never performs relocation or
 * layout, and it never owns the symbol table: it reads entries and
 * conditionally overwrites them, nothing more.
 *
 * every operation reports through the diagnostics sink. fatal outcomes
 * are recorded and the current symbol or object is still finished, so
 * one broken symbol doesn't hide the next ten problems.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::diag::Diagnostics;
use super::symtab::{ SymbolTable, Symbol, SymbolKind };
use super::lang::InputFile;
use super::cref::CrossReference;

use std::collections::HashSet;
use indexmap::set::IndexSet;
use goblin::elf::{ Elf, SectionHeader };
use goblin::strtab::Strtab;

/* after this many consecutive reports for the same undefined name,
   further reports collapse into a single follow-up line */
const MAX_ERRORS_IN_A_ROW: usize = 5;

/* what an input object is contributing for a symbol name */
pub enum Incoming
{
    Defined { value: u64, section: String },
    Common { size: u64 }
}

/* policy-owned state: which archive members were admitted, and the
   flood-control bookkeeping for undefined references */
pub struct Resolution
{
    admitted: IndexSet<String>,
    last_undefined: Option<String>,
    run_length: usize,
    reported_once: HashSet<String>
}

impl Resolution
{
    pub fn new() -> Resolution
    {
        Resolution
        {
            admitted: IndexSet::new(),
            last_undefined: None,
            run_length: 0,
            reported_once: HashSet::new()
        }
    }

    /* the driver wants to pull a member out of an archive to satisfy an
       undefined reference. record exactly one input-file entry per
       member: admitting the same member again is a no-op, which is what
       makes the group rescan loop safe to run to a fixed point.
       => archive = path of the archive being searched
          member = member name within the archive
          symbol = the undefined name being satisfied
          needed_by = attribution for the map: the referencing object,
                      with a relocation-level location when one was found
       <= true if the member is newly admitted */
    pub fn add_archive_element(&mut self, inputs: &mut Vec<InputFile>, cref: &mut CrossReference,
                               archive: &str, member: &str, symbol: &str, needed_by: &str) -> bool
    {
        let identity = format!("{}({})", archive, member);
        if self.admitted.insert(identity.clone()) == false
        {
            return false;
        }

        inputs.push(InputFile
        {
            name: identity,
            from_archive: Some(String::from(archive)),
            as_needed: false,
            group_member: false
        });

        cref.record_pull(archive, member, symbol, needed_by);
        true
    }

    /* two non-discarded sections both claim to define a symbol. always
       fatal class; and if relocation shrinking was requested, the
       request is demoted to a warning and switched off, since shrinking
       around a doubled definition is unsound */
    pub fn multiple_definition(&mut self, diag: &mut Diagnostics, relax: &mut bool,
                               existing: &Symbol, new_object: &str, new_section: &str)
    {
        let first_site = format!("{}({})",
            existing.object.as_deref().unwrap_or("<unknown>"),
            existing.section.as_deref().unwrap_or("<unknown>"));

        diag.fatal(format!("multiple definition of `{}': first defined in {}, also in {}({})",
                           existing.name, first_site, new_object, new_section));

        if *relax
        {
            diag.warning(String::from("relocation shrinking disabled: multiple definitions present"));
            *relax = false;
        }
    }

    /* a common symbol collides with another common or a real definition.
       a real definition always wins over a common; between two commons
       the larger size wins. a size mismatch between commons names the
       smaller as overridden, but only when common warnings are on */
    pub fn multiple_common(&mut self, diag: &mut Diagnostics, warn_common: bool,
                           table: &mut SymbolTable, name: &str, object: &str, incoming: Incoming)
    {
        let existing = match table.lookup(name)
        {
            Some(symbol) => symbol.clone(),
            None =>
            {
                /* first sighting: just record whatever arrived */
                table.put(incoming_symbol(name, object, &incoming));
                return;
            }
        };

        match (existing.kind, &incoming)
        {
            /* a real definition arrived over a common: the definition wins */
            (SymbolKind::Common, Incoming::Defined { .. }) =>
            {
                if warn_common
                {
                    diag.warning(format!("definition of `{}' in {} overriding common in {}",
                        name, object, existing.object.as_deref().unwrap_or("<unknown>")));
                }
                table.put(incoming_symbol(name, object, &incoming));
            },

            /* a common arrived over a real definition: the definition stays */
            (SymbolKind::Defined, Incoming::Common { .. }) =>
            {
                if warn_common
                {
                    diag.warning(format!("common of `{}' in {} overridden by definition in {}",
                        name, object, existing.object.as_deref().unwrap_or("<unknown>")));
                }
            },

            /* two commons: keep the larger, warn about the smaller when
               the sizes differ and warnings are enabled */
            (SymbolKind::Common, Incoming::Common { size }) =>
            {
                if *size > existing.size
                {
                    if warn_common && *size != existing.size
                    {
                        diag.warning(format!("common of `{}' in {} (size {}) overridden by larger common in {} (size {})",
                            name, existing.object.as_deref().unwrap_or("<unknown>"), existing.size, object, size));
                    }
                    table.put(incoming_symbol(name, object, &incoming));
                }
                else if *size < existing.size
                {
                    if warn_common
                    {
                        diag.warning(format!("common of `{}' in {} (size {}) overridden by larger common in {} (size {})",
                            name, object, size, existing.object.as_deref().unwrap_or("<unknown>"), existing.size));
                    }
                }
                /* equal sizes: first one stands, silently */
            },

            /* an undefined entry upgrades to whatever arrived */
            (SymbolKind::Undefined, _) | (SymbolKind::Indirect, _) =>
            {
                table.put(incoming_symbol(name, object, &incoming));
            },

            /* defined meeting defined is the multiple-definition path,
               handled by the driver before it gets here */
            (SymbolKind::Defined, Incoming::Defined { section, .. }) =>
            {
                let mut relax = false;
                self.multiple_definition(diag, &mut relax, &existing, object, section);
            }
        }
    }

    /* report an undefined reference with flood control. a run of
       consecutive reports for one name is capped: five individual
       lines, then one "more follow" line, then silence for that run.
       warn-once mode suppresses everything after the first report of a
       name for the whole link. a fatal report escalates the run's exit
       code but reporting carries on regardless */
    pub fn undefined_symbol(&mut self, diag: &mut Diagnostics, warn_once: bool,
                            name: &str, location: &str, is_fatal: bool)
    {
        if is_fatal
        {
            diag.raise_fatal();
        }

        if warn_once
        {
            if self.reported_once.contains(name)
            {
                return;
            }
        }

        /* track the run of consecutive reports for this name */
        if self.last_undefined.as_deref() == Some(name)
        {
            self.run_length = self.run_length + 1;
        }
        else
        {
            self.last_undefined = Some(String::from(name));
            self.run_length = 1;
        }

        if self.run_length <= MAX_ERRORS_IN_A_ROW
        {
            diag.warning(format!("{}: undefined reference to `{}'", location, name));
        }
        else if self.run_length == MAX_ERRORS_IN_A_ROW + 1
        {
            diag.warning(format!("{}: more undefined references to `{}' follow", location, name));
        }
        /* beyond the threshold: swallowed */

        self.reported_once.insert(String::from(name));
    }

    /* a symbol flagged for warning-on-reference has been referenced.
       prefer a relocation-level attribution if the caller found one,
       otherwise blame the object as a whole */
    pub fn warning_symbol(&mut self, diag: &mut Diagnostics, message: &str,
                          object: &str, attribution: Option<String>)
    {
        match attribution
        {
            Some(at) => diag.warning(format!("{}: {}", at, message)),
            None => diag.warning(format!("{}: {}", object, message))
        }
    }

    /* notice tracing: observational recording of definitions and
       references for the cross-reference table. never changes outcomes */
    pub fn notice(&self, cref: &mut CrossReference, name: &str, object: &str, defined: bool)
    {
        match defined
        {
            true => cref.record_definition(name, object),
            false => cref.record_reference(name, object)
        }
    }

    pub fn admitted_count(&self) -> usize { self.admitted.len() }
}

fn incoming_symbol(name: &str, object: &str, incoming: &Incoming) -> Symbol
{
    match incoming
    {
        Incoming::Defined { value, section } => Symbol
        {
            name: String::from(name),
            kind: SymbolKind::Defined,
            value: *value,
            size: 0,
            object: Some(String::from(object)),
            section: Some(section.clone())
        },
        Incoming::Common { size } => Symbol
        {
            name: String::from(name),
            kind: SymbolKind::Common,
            value: 0,
            size: *size,
            object: Some(String::from(object)),
            section: None
        }
    }
}

/* scan a referencing object's relocations for one targeting the given
   symbol, to attribute a reference to a section and offset within the
   object. falls back to None when no relocation matches, in which case
   the caller reports at object granularity */
pub fn relocation_attribution(object_name: &str, elf: &Elf, symbol: &str) -> Option<String>
{
    for (section_idx, relocations) in &elf.shdr_relocs
    {
        for reloc in relocations.iter()
        {
            let sym = match elf.syms.get(reloc.r_sym)
            {
                Some(sym) => sym,
                None => continue
            };

            if let Some(name) = elf.strtab.get_at(sym.st_name)
            {
                if name == symbol
                {
                    let section = reloc_target_name(&elf.section_headers,
                                                    &elf.shdr_strtab, *section_idx)
                        .unwrap_or("?");
                    return Some(format!("{}({}+{:#x})", object_name, section, reloc.r_offset));
                }
            }
        }
    }

    None
}

/* shdr_relocs is keyed by the relocation section's own header index.
   the section those relocations apply to is the one its sh_info names,
   so the attribution has to hop through that link */
fn reloc_target_name<'a>(headers: &[SectionHeader], strtab: &'a Strtab,
                         reloc_idx: usize) -> Option<&'a str>
{
    let target_idx = headers.get(reloc_idx)?.sh_info as usize;
    strtab.get_at(headers.get(target_idx)?.sh_name)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::diag::Severity;

    fn quiet_diag() -> Diagnostics
    {
        let mut diag = Diagnostics::new();
        diag.silence();
        diag
    }

    fn common(size: u64) -> Incoming
    {
        Incoming::Common { size }
    }

    fn defined() -> Incoming
    {
        Incoming::Defined { value: 0x100, section: String::from(".data") }
    }

    #[test]
    fn larger_common_wins()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();
        let mut table = SymbolTable::new();

        resolution.multiple_common(&mut diag, true, &mut table, "buf", "a.o", common(4));
        resolution.multiple_common(&mut diag, true, &mut table, "buf", "b.o", common(16));

        let symbol = table.lookup("buf").unwrap();
        assert_eq!(symbol.kind, SymbolKind::Common);
        assert_eq!(symbol.size, 16);
        assert_eq!(symbol.object.as_deref(), Some("b.o"));
        assert_eq!(diag.count(Severity::Warning), 1);
    }

    #[test]
    fn common_size_warning_gated_by_flag()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();
        let mut table = SymbolTable::new();

        resolution.multiple_common(&mut diag, false, &mut table, "buf", "a.o", common(4));
        resolution.multiple_common(&mut diag, false, &mut table, "buf", "b.o", common(16));

        assert_eq!(table.lookup("buf").unwrap().size, 16);
        assert_eq!(diag.count(Severity::Warning), 0);
    }

    #[test]
    fn real_definition_beats_common_either_order()
    {
        /* common first, then definition */
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();
        let mut table = SymbolTable::new();
        resolution.multiple_common(&mut diag, false, &mut table, "buf", "a.o", common(64));
        resolution.multiple_common(&mut diag, false, &mut table, "buf", "b.o", defined());
        assert_eq!(table.lookup("buf").unwrap().kind, SymbolKind::Defined);
        assert_eq!(table.lookup("buf").unwrap().object.as_deref(), Some("b.o"));

        /* definition first, then common */
        let mut table = SymbolTable::new();
        resolution.multiple_common(&mut diag, false, &mut table, "buf", "b.o", defined());
        resolution.multiple_common(&mut diag, false, &mut table, "buf", "a.o", common(64));
        assert_eq!(table.lookup("buf").unwrap().kind, SymbolKind::Defined);
        assert_eq!(table.lookup("buf").unwrap().object.as_deref(), Some("b.o"));
    }

    #[test]
    fn archive_admission_is_idempotent()
    {
        let mut resolution = Resolution::new();
        let mut cref = CrossReference::new();
        let mut inputs = Vec::new();

        assert!(resolution.add_archive_element(&mut inputs, &mut cref,
            "libc.a", "printf.o", "printf", "main.o"));

        /* same member for a different undefined symbol: no new record */
        assert!(resolution.add_archive_element(&mut inputs, &mut cref,
            "libc.a", "printf.o", "fprintf", "main.o") == false);

        assert_eq!(inputs.len(), 1);
        assert_eq!(resolution.admitted_count(), 1);
        assert_eq!(inputs[0].from_archive.as_deref(), Some("libc.a"));
    }

    #[test]
    fn undefined_flood_control_caps_at_threshold()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();

        for i in 0..9
        {
            let location = format!("obj{}.o", i);
            resolution.undefined_symbol(&mut diag, false, "missing", &location, false);
        }

        /* exactly five individual reports plus one follow-up line */
        assert_eq!(diag.count(Severity::Warning), 6);
        let messages: Vec<String> = diag.reports().map(|d| d.message.clone()).collect();
        assert!(messages[4].contains("undefined reference to `missing'"));
        assert!(messages[5].contains("more undefined references to `missing' follow"));
    }

    #[test]
    fn undefined_run_resets_on_new_name()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();

        for _ in 0..7
        {
            resolution.undefined_symbol(&mut diag, false, "first", "a.o", false);
        }
        resolution.undefined_symbol(&mut diag, false, "second", "b.o", false);

        /* 5 + 1 for the first run, then a fresh individual report */
        assert_eq!(diag.count(Severity::Warning), 7);
    }

    #[test]
    fn warn_once_suppresses_globally()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();

        resolution.undefined_symbol(&mut diag, true, "missing", "a.o", false);
        resolution.undefined_symbol(&mut diag, true, "missing", "b.o", false);
        resolution.undefined_symbol(&mut diag, true, "missing", "c.o", false);

        assert_eq!(diag.count(Severity::Warning), 1);
    }

    #[test]
    fn fatal_reference_escalates_exit_code()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();

        resolution.undefined_symbol(&mut diag, false, "missing", "a.o", true);
        assert!(diag.has_fatal());
    }

    #[test]
    fn relocation_sections_attribute_their_targets()
    {
        fn header(sh_name: usize, sh_info: u32) -> SectionHeader
        {
            SectionHeader
            {
                sh_name,
                sh_type: 0,
                sh_flags: 0,
                sh_addr: 0,
                sh_offset: 0,
                sh_size: 0,
                sh_link: 0,
                sh_info,
                sh_addralign: 0,
                sh_entsize: 0
            }
        }

        /* header 1 is .text, header 2 is .rela.text with sh_info
           pointing back at header 1 */
        let headers = vec![ header(0, 0), header(1, 0), header(7, 1) ];
        let strtab = Strtab::new_preparsed(b"\0.text\0.rela.text\0", 0x0)
            .expect("valid string table");

        /* the relocation section's index names the section it applies
           to, not itself */
        assert_eq!(reloc_target_name(&headers, &strtab, 2), Some(".text"));

        /* an out-of-range index degrades to no attribution */
        assert_eq!(reloc_target_name(&headers, &strtab, 9), None);
    }

    #[test]
    fn multiple_definition_disables_relax()
    {
        let mut resolution = Resolution::new();
        let mut diag = quiet_diag();
        let mut relax = true;

        let existing = Symbol
        {
            name: String::from("main"),
            kind: SymbolKind::Defined,
            value: 0,
            size: 0,
            object: Some(String::from("a.o")),
            section: Some(String::from(".text"))
        };

        resolution.multiple_definition(&mut diag, &mut relax, &existing, "b.o", ".text");
        assert!(diag.has_fatal());
        assert!(relax == false);
        assert_eq!(diag.count(Severity::Warning), 1);
    }
}
