/* itsyld link driver
 *
 * walks the input stream in command-line order, parses object files and
 * archives, and feeds every symbol sighting into the resolution policy
 * engine. archives are rescanned to a fixed point, alone or as part of
 * a --start-group/--end-group set, with admission idempotence in the
 * policy engine making the loops safe. when the stream runs dry the
 * driver reports every reference still dangling, with per-object
 * attribution, and hands the finished symbol table back.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::session::{ LinkSession, StreamItem, Group };
use super::symtab::{ SymbolTable, Symbol, SymbolKind };
use super::policy::{ Incoming, relocation_attribution };
use super::ctor::{ SetKind, SetEntry, set_symbol_name };
use super::lang::{ Statement, InputFile };

use std::collections::{ HashMap, HashSet };
use goblin::elf::Elf;
use goblin::elf::sym::{ STB_LOCAL, STB_WEAK };
use goblin::archive::Archive;

/* special section indices a symbol's st_shndx can carry */
const SHN_UNDEF: usize = 0;
const SHN_ABS: usize = 0xfff1;
const SHN_COMMON: usize = 0xfff2;

pub struct Driver
{
    table: SymbolTable,

    /* warning text from .gnu.warning.SYMBOL sections, keyed by symbol */
    warnings: HashMap<String, String>,

    /* where each undefined symbol was first referenced from, at
       relocation granularity when the referencing object has a matching
       relocation. archive pulls are attributed to these sites */
    ref_sites: HashMap<String, String>
}

/* run the whole resolution pass over the session's input stream and
   hand back the finished global symbol table */
pub fn run(session: &mut LinkSession) -> SymbolTable
{
    let mut driver = Driver::new();

    driver.seed(session);

    for item in session.stream()
    {
        driver.process_item(session, &item);
    }

    driver.finish(session);
    driver.table
}

impl Driver
{
    fn new() -> Driver
    {
        Driver
        {
            table: SymbolTable::new(),
            warnings: HashMap::new(),
            ref_sites: HashMap::new()
        }
    }

    /* enter the symbols that are undefined before any file is read:
       -u and EXTERN names, plus the entry point so archive searches
       will pull whatever defines it */
    fn seed(&mut self, session: &mut LinkSession)
    {
        for name in session.forced_undefined.clone()
        {
            self.table.reference(&name, "command line");
            session.resolution.notice(&mut session.cref, &name, "command line", false);
        }

        if let Some(entry) = session.config.entry.clone()
        {
            self.table.reference(&entry, "entry point");
        }
    }

    fn process_item(&mut self, session: &mut LinkSession, item: &StreamItem)
    {
        match item
        {
            StreamItem::SearchPath(path) => session.search.add(path),
            StreamItem::File(filename) => self.process_file(session, filename),
            StreamItem::Library(shortname) => self.process_library(session, shortname),
            StreamItem::Group(group) => self.process_group(session, group)
        }
    }

    /* locate a named input and process it per its type */
    fn process_file(&mut self, session: &mut LinkSession, filename: &str)
    {
        let path = match session.search.resolve(filename)
        {
            Some(path) => path,
            None =>
            {
                session.diag.fatal(format!("cannot find {}: no such file in search paths", filename));
                return;
            }
        };

        let bytes = match std::fs::read(&path)
        {
            Ok(bytes) => bytes,
            Err(reason) =>
            {
                session.diag.fatal(format!("cannot load {}: {}", path.display(), reason));
                return;
            }
        };

        match path.extension().and_then(|e| e.to_str()).unwrap_or("")
        {
            "a" | "rlib" => self.process_archive(session, &path.display().to_string(), &bytes),
            _ =>
            {
                session.record_input(InputFile
                {
                    name: String::from(filename),
                    from_archive: None,
                    as_needed: false,
                    group_member: false
                });
                self.process_object(session, filename, &bytes);
            }
        }
    }

    /* a -l short-name: resolve to an archive through the search paths */
    fn process_library(&mut self, session: &mut LinkSession, shortname: &str)
    {
        match session.search.find_library(shortname)
        {
            Some(path) =>
            {
                let name = path.display().to_string();
                match std::fs::read(&path)
                {
                    Ok(bytes) => self.process_archive(session, &name, &bytes),
                    Err(reason) => session.diag.fatal(format!("cannot load {}: {}", name, reason))
                }
            },
            None => session.diag.fatal(format!("cannot find -l{}", shortname))
        }
    }

    /* loop through the group's files over and over until a whole pass
       admits no new archive member */
    fn process_group(&mut self, session: &mut LinkSession, group: &Group)
    {
        loop
        {
            let admitted_before = session.resolution.admitted_count();

            for member in group.iter()
            {
                match member
                {
                    StreamItem::File(filename) => self.process_file(session, filename),
                    StreamItem::Library(shortname) => self.process_library(session, shortname),
                    _ => () /* search paths and nested groups don't appear in groups */
                }
            }

            /* exit once a pass pulled nothing new out of any archive */
            if session.resolution.admitted_count() == admitted_before
            {
                break;
            }
        }
    }

    /* walk an archive's symbol index against the undefined list, pulling
       members until a pass admits nothing. a pulled member may create
       fresh undefined references, so the scan repeats */
    fn process_archive(&mut self, session: &mut LinkSession, archive_name: &str, bytes: &[u8])
    {
        let archive = match Archive::parse(bytes)
        {
            Ok(archive) => archive,
            Err(reason) =>
            {
                session.diag.fatal(format!("cannot parse archive {}: {}", archive_name, reason));
                return;
            }
        };

        loop
        {
            let admitted_before = session.resolution.admitted_count();

            for name in self.table.undefined()
            {
                let member = match archive.member_of_symbol(&name)
                {
                    Some(member) => String::from(member),
                    None => continue
                };

                /* attribute the pull to whoever first wanted the symbol */
                let needed_by = self.reference_site(&name);

                if session.resolution.add_archive_element(&mut session.inputs, &mut session.cref,
                                                          archive_name, &member, &name, &needed_by)
                {
                    match archive.extract(&member, bytes)
                    {
                        Ok(slice) =>
                        {
                            let identity = format!("{}({})", archive_name, member);
                            self.process_object(session, &identity, slice);
                        },
                        Err(reason) => session.diag.fatal(format!(
                            "cannot extract {} from archive {}: {}", member, archive_name, reason))
                    }
                }
            }

            if session.resolution.admitted_count() == admitted_before
            {
                break;
            }
        }
    }

    /* parse one ELF object and feed its global symbols through the
       policy engine */
    fn process_object(&mut self, session: &mut LinkSession, object_name: &str, bytes: &[u8])
    {
        let elf = match Elf::parse(bytes)
        {
            Ok(elf) => elf,
            Err(reason) =>
            {
                session.diag.fatal(format!("cannot parse {}: {}", object_name, reason));
                return;
            }
        };

        self.collect_warning_sections(&elf, bytes);

        for sym in elf.syms.iter()
        {
            let symbol_name = match elf.strtab.get_at(sym.st_name)
            {
                Some(name) if name.is_empty() == false => name,
                _ => continue
            };

            /* locals never enter the global table */
            if sym.st_bind() == STB_LOCAL
            {
                continue;
            }

            if sym.st_shndx == SHN_UNDEF
            {
                self.table.reference(symbol_name, object_name);
                session.resolution.notice(&mut session.cref, symbol_name, object_name, false);

                /* remember where the symbol was first wanted, down to the
                   relocation that uses it when one can be found */
                if self.ref_sites.contains_key(symbol_name) == false
                {
                    let site = relocation_attribution(object_name, &elf, symbol_name)
                        .unwrap_or_else(|| String::from(object_name));
                    self.ref_sites.insert(String::from(symbol_name), site);
                }

                /* a reference to a warning-carrying symbol reports the
                   warning, attributed to the relocation if one matches */
                if let Some(message) = self.warnings.get(symbol_name)
                {
                    let message = message.clone();
                    let attribution = relocation_attribution(object_name, &elf, symbol_name);
                    session.resolution.warning_symbol(&mut session.diag, &message,
                                                      object_name, attribution);
                }
                continue;
            }

            if sym.st_shndx == SHN_COMMON
            {
                session.resolution.multiple_common(&mut session.diag, session.config.warn_common,
                    &mut self.table, symbol_name, object_name,
                    Incoming::Common { size: sym.st_size });
                session.resolution.notice(&mut session.cref, symbol_name, object_name, true);
                continue;
            }

            /* a definition in a real or absolute section */
            let section = self.section_name(&elf, sym.st_shndx);
            let already_defined = self.table.lookup(symbol_name).map(|s| s.kind)
                == Some(SymbolKind::Defined);

            if already_defined
            {
                /* a weak definition loses to an existing one silently */
                if sym.st_bind() != STB_WEAK
                {
                    if let Some(existing) = self.table.lookup(symbol_name).cloned()
                    {
                        session.resolution.multiple_definition(&mut session.diag,
                            &mut session.config.relax, &existing, object_name, &section);
                    }
                }
            }
            else
            {
                session.resolution.multiple_common(&mut session.diag, session.config.warn_common,
                    &mut self.table, symbol_name, object_name,
                    Incoming::Defined { value: sym.st_value, section: section.clone() });
            }

            session.resolution.notice(&mut session.cref, symbol_name, object_name, true);

            /* contributions to the constructor and destructor sets */
            if section.starts_with(".ctors") || section.starts_with(".dtors")
            {
                let kind = match section.starts_with(".ctors")
                {
                    true => SetKind::Constructor,
                    false => SetKind::Destructor
                };

                session.ctors.add(kind, SetEntry
                {
                    symbol: String::from(symbol_name),
                    object: String::from(object_name),
                    section: section.clone()
                }, &mut session.diag);
            }
        }
    }

    /* the best attribution held for a symbol's first reference: the
       relocation site when one was recorded, else the first referencing
       object from the table */
    fn reference_site(&self, name: &str) -> String
    {
        if let Some(site) = self.ref_sites.get(name)
        {
            return site.clone();
        }

        self.table.lookup(name)
            .and_then(|s| s.object.clone())
            .unwrap_or_else(|| String::from("<unknown>"))
    }

    /* the name of the section a defined symbol lives in */
    fn section_name(&self, elf: &Elf, shndx: usize) -> String
    {
        if shndx == SHN_ABS
        {
            return String::from("*ABS*");
        }

        elf.section_headers.get(shndx)
            .and_then(|sh| elf.shdr_strtab.get_at(sh.sh_name))
            .map(String::from)
            .unwrap_or_else(|| String::from("<unknown>"))
    }

    /* harvest .gnu.warning.SYMBOL sections: their contents are shown
       whenever SYMBOL is referenced later in the link */
    fn collect_warning_sections(&mut self, elf: &Elf, bytes: &[u8])
    {
        for sh in &elf.section_headers
        {
            let section_name = match elf.shdr_strtab.get_at(sh.sh_name)
            {
                Some(name) => name,
                None => continue
            };

            let symbol = match section_name.strip_prefix(".gnu.warning.")
            {
                Some(symbol) => symbol,
                None => continue
            };

            let start = sh.sh_offset as usize;
            let end = start.saturating_add(sh.sh_size as usize);
            if let Some(text) = bytes.get(start..end)
            {
                let message = String::from_utf8_lossy(text)
                    .trim_end_matches('\0').trim().to_string();
                self.warnings.insert(String::from(symbol), message);
            }
        }
    }

    /* the stream is exhausted: report what never resolved. script
       assignments count as definitions, the entry symbol gets its own
       gentler report, and everything else is a fatal undefined
       reference attributed to its first referencer */
    fn finish(&mut self, session: &mut LinkSession)
    {
        self.define_set_symbols(session);

        let script_defined = script_defined_names(&session.script);
        let entry = session.config.entry.clone();

        for name in self.table.undefined()
        {
            if script_defined.contains(&name)
            {
                continue;
            }

            if entry.as_deref() == Some(name.as_str())
            {
                continue;
            }

            let location = self.table.lookup(&name)
                .and_then(|s| s.object.clone())
                .unwrap_or_else(|| String::from("<unknown>"));

            session.resolution.undefined_symbol(&mut session.diag, session.config.warn_once,
                                                &name, &location, true);
        }

        /* a missing entry point doesn't doom the link, but say so */
        if let Some(entry) = entry
        {
            let defined = match self.table.lookup(&entry)
            {
                Some(symbol) => symbol.kind != SymbolKind::Undefined,
                None => false
            };

            if defined == false && script_defined.contains(&entry) == false
            {
                session.diag.warning(format!("cannot find entry symbol {}", entry));
            }
        }
    }

    /* the collected constructor and destructor sets live behind the two
       well-known set symbols, spelled with the target's prefix. defining
       them here lets references to the lists resolve like any other */
    fn define_set_symbols(&mut self, session: &LinkSession)
    {
        let prefix = session.emulation.symbol_prefix();

        for (kind, entries, section) in
        [
            (SetKind::Constructor, session.ctors.constructors(), ".ctors"),
            (SetKind::Destructor, session.ctors.destructors(), ".dtors")
        ].iter()
        {
            if entries.is_empty()
            {
                continue;
            }

            self.table.put(Symbol
            {
                name: set_symbol_name(*kind, prefix),
                kind: SymbolKind::Defined,
                value: 0,
                size: entries.len() as u64,
                object: Some(String::from("<internal>")),
                section: Some(String::from(*section))
            });
        }
    }
}

/* every symbol a script assignment will define, at any scope. the
   location counter itself doesn't count */
fn script_defined_names(statements: &[Statement]) -> HashSet<String>
{
    let mut names = HashSet::new();
    collect_assigned(statements, &mut names);
    names
}

fn collect_assigned(statements: &[Statement], names: &mut HashSet<String>)
{
    for statement in statements
    {
        match statement
        {
            Statement::Assignment(assignment) =>
            {
                if assignment.symbol != "."
                {
                    names.insert(assignment.symbol.clone());
                }
            },
            Statement::OutputSection(section) => collect_assigned(&section.children, names),
            _ => ()
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::session::{ LinkSession, Config };
    use crate::emulate::Rv64Emulation;
    use crate::diag::Severity;
    use crate::expr::{ AssignOp, Expression };
    use crate::lang::{ Assignment, OutputSection };

    fn quiet_session() -> LinkSession
    {
        let mut session = LinkSession::new(Config::new(), Box::new(Rv64Emulation));
        session.diag.silence();
        session
    }

    fn assignment(symbol: &str) -> Statement
    {
        Statement::Assignment(Assignment
        {
            symbol: String::from(symbol),
            op: AssignOp::Set,
            value: Expression::Value(0),
            provide: false,
            hidden: false
        })
    }

    #[test]
    fn dangling_references_are_fatal_with_attribution()
    {
        let mut session = quiet_session();
        let mut driver = Driver::new();
        driver.table.reference("missing", "main.o");

        driver.finish(&mut session);

        assert!(session.diag.has_fatal());
        let report = session.diag.reports().next().unwrap();
        assert!(report.message.contains("main.o"));
        assert!(report.message.contains("undefined reference to `missing'"));
    }

    #[test]
    fn script_assignments_satisfy_references()
    {
        let mut session = quiet_session();
        session.script.push(assignment("__bss_end"));

        /* assignments inside output sections count too */
        let mut text = OutputSection::new(".text");
        text.children.push(assignment("__text_end"));
        session.script.push(Statement::OutputSection(text));

        let mut driver = Driver::new();
        driver.table.reference("__bss_end", "a.o");
        driver.table.reference("__text_end", "a.o");

        driver.finish(&mut session);
        assert!(session.diag.has_fatal() == false);
    }

    #[test]
    fn missing_entry_symbol_warns_without_dooming_the_link()
    {
        let mut session = quiet_session();
        session.config.entry = Some(String::from("_start"));

        let mut driver = Driver::new();
        driver.seed(&mut session);
        driver.finish(&mut session);

        assert!(session.diag.has_fatal() == false);
        assert_eq!(session.diag.count(Severity::Warning), 1);
    }

    #[test]
    fn forced_undefined_seed_the_table()
    {
        let mut session = quiet_session();
        session.forced_undefined.push(String::from("keep_me"));

        let mut driver = Driver::new();
        driver.seed(&mut session);

        assert_eq!(driver.table.undefined(), vec![String::from("keep_me")]);
    }

    #[test]
    fn archive_pulls_prefer_relocation_sites()
    {
        let mut driver = Driver::new();
        driver.table.reference("printf", "main.o");

        /* with no recorded site the first referencing object is blamed */
        assert_eq!(driver.reference_site("printf"), "main.o");

        /* a recorded relocation-level site wins over the object name */
        driver.ref_sites.insert(String::from("printf"),
                                String::from("main.o(.text+0x24)"));
        assert_eq!(driver.reference_site("printf"), "main.o(.text+0x24)");

        assert_eq!(driver.reference_site("never_seen"), "<unknown>");
    }

    #[test]
    fn set_symbols_materialize_and_satisfy_references()
    {
        let mut session = quiet_session();
        session.ctors.add(SetKind::Constructor, SetEntry
        {
            symbol: String::from("init_a"),
            object: String::from("a.o"),
            section: String::from(".ctors")
        }, &mut session.diag);

        let mut driver = Driver::new();
        driver.table.reference("__CTOR_LIST__", "crtbegin.o");
        driver.finish(&mut session);

        let list = driver.table.lookup("__CTOR_LIST__").unwrap();
        assert_eq!(list.kind, SymbolKind::Defined);
        assert_eq!(list.size, 1);
        assert!(session.diag.has_fatal() == false);

        /* no destructors were collected, so no destructor list appears */
        assert!(driver.table.lookup("__DTOR_LIST__").is_none());
    }

    #[test]
    fn dot_assignments_do_not_define_anything()
    {
        let statements = vec![ assignment(".") ];
        assert!(script_defined_names(&statements).is_empty());
    }
}
