/* itsyld link session
 *
 * centralize all the context about a particular linking task in one
 * place that gets passed around explicitly: the parsed statement tree,
 * memory regions, program headers, version nodes, resolution state,
 * diagnostics and configuration all live here for exactly one
 * invocation of the tool. nothing in the engine is process-global.
 *
 * the order of files on the command line is important, so the command
 * line arguments are stored as a stream of items stepped through one
 * at a time, with groups handled as nested streams.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::lang::{ Statement, InputFile, MemoryRegions, ProgramHeaders, resolve_phdr_references };
use super::version::VersionTree;
use super::diag::Diagnostics;
use super::policy::Resolution;
use super::ctor::ConstructorSets;
use super::cref::CrossReference;
use super::emulate::Emulation;
use super::search::Paths;

pub type Filename = String;

/* we have to handle a stream of input items, which could be search
   paths, object files, -l libraries, or archives grouped for rescan */
#[derive(Clone)]
pub enum StreamItem
{
    File(Filename),
    Library(Filename),
    SearchPath(Filename),
    Group(Group)
}

/* handle groups of items: archives in a group are rescanned until a
   pass admits nothing new */
#[derive(Clone)]
pub struct Group
{
    files: Vec<StreamItem>
}

impl Group
{
    pub fn new() -> Group { Group { files: Vec::new() } }
    pub fn add(&mut self, item: StreamItem) { self.files.push(item) }
    pub fn iter(&self) -> std::slice::Iter<'_, StreamItem> { self.files.iter() }
    pub fn is_empty(&self) -> bool { self.files.is_empty() }
}

/* switches collected from the command line and from script statements.
   command-line settings win over script ones, so script absorption
   never overwrites a field already set */
pub struct Config
{
    pub output_file: Filename,
    pub script_file: Option<Filename>,
    pub version_script_file: Option<Filename>,
    pub map_file: Option<Filename>,
    pub print_map: bool,
    pub entry: Option<String>,
    pub defsyms: Vec<String>,

    pub warn_common: bool,
    pub warn_once: bool,
    pub warn_constructors: bool,
    pub fatal_warnings: bool,
    pub build_constructors: bool,
    pub relax: bool,
    pub no_inhibit_exec: bool,
    pub force_common_allocation: bool,
    pub cref: bool
}

impl Config
{
    pub fn new() -> Config
    {
        Config
        {
            /* the ld-compatible executable filename default is a.out */
            output_file: String::from("a.out"),

            script_file: None,
            version_script_file: None,
            map_file: None,
            print_map: false,
            entry: None,
            defsyms: Vec::new(),

            warn_common: false,
            warn_once: false,
            warn_constructors: false,
            fatal_warnings: false,
            build_constructors: true,
            relax: false,
            no_inhibit_exec: false,
            force_common_allocation: false,
            cref: false
        }
    }
}

/* this is what we're working with: every mutable piece of one link run */
pub struct LinkSession
{
    pub config: Config,
    pub diag: Diagnostics,
    pub search: Paths,
    pub emulation: Box<dyn Emulation>,

    /* the entity model built by the grammar */
    pub script: Vec<Statement>,
    pub memory: MemoryRegions,
    pub phdrs: ProgramHeaders,
    pub versions: VersionTree,

    /* append-only records the policy engine writes as links resolve */
    pub inputs: Vec<InputFile>,
    pub resolution: Resolution,
    pub ctors: ConstructorSets,
    pub cref: CrossReference,

    /* symbols the script wants treated as undefined from the start */
    pub forced_undefined: Vec<String>,

    /* NOCROSSREFS groups for the cross-reference checker */
    pub nocrossrefs: Vec<Vec<String>>,

    input_stream: Vec<StreamItem>
}

impl LinkSession
{
    pub fn new(config: Config, emulation: Box<dyn Emulation>) -> LinkSession
    {
        let mut diag = Diagnostics::new();
        if config.fatal_warnings
        {
            diag.promote_warnings();
        }

        let ctors = ConstructorSets::new(config.build_constructors, config.warn_constructors);

        LinkSession
        {
            config,
            diag,
            search: Paths::new(),
            emulation,
            script: Vec::new(),
            memory: MemoryRegions::new(),
            phdrs: ProgramHeaders::new(),
            versions: VersionTree::new(),
            inputs: Vec::new(),
            resolution: Resolution::new(),
            ctors,
            cref: CrossReference::new(),
            forced_undefined: Vec::new(),
            nocrossrefs: Vec::new(),
            input_stream: Vec::new()
        }
    }

    /* functions to update and access the input stream */
    pub fn add_to_stream(&mut self, item: StreamItem)
    {
        self.input_stream.push(item);
    }

    pub fn stream(&self) -> Vec<StreamItem>
    {
        self.input_stream.clone()
    }

    /* run the post-parse fix-up passes and absorb the statements that
       configure the session rather than describe layout: search paths,
       entry point, map file, forced-undefined symbols, and input files
       named by the script itself. called once, after every script has
       been parsed and before resolution begins */
    pub fn finish_parse(&mut self) -> Result<(), super::diag::LinkError>
    {
        resolve_phdr_references(&mut self.script, &self.phdrs)?;
        self.versions.resolve_dependencies()?;

        let mut from_script = Vec::new();
        for statement in &self.script
        {
            match statement
            {
                Statement::SearchDir(path) => self.search.add(path),

                Statement::Entry(symbol) =>
                {
                    /* the command line wins over the script */
                    if self.config.entry.is_none()
                    {
                        self.config.entry = Some(symbol.clone());
                    }
                },

                Statement::Output(file) =>
                {
                    if self.config.output_file == "a.out"
                    {
                        self.config.output_file = file.clone();
                    }
                },

                Statement::Map(file) =>
                {
                    if self.config.map_file.is_none()
                    {
                        self.config.map_file = Some(file.clone());
                    }
                },

                Statement::Extern(symbols) =>
                {
                    for symbol in symbols
                    {
                        self.forced_undefined.push(symbol.clone());
                    }
                },

                Statement::ForceCommonAllocation =>
                {
                    self.config.force_common_allocation = true;
                },

                Statement::Nocrossrefs(names) =>
                {
                    self.nocrossrefs.push(names.clone());
                },

                Statement::InputFiles(files) =>
                {
                    /* AS_NEEDED entries ride along as plain files; whether
                       they become dependencies is decided by whether a
                       reference actually resolves from them */
                    for file in files
                    {
                        from_script.push(StreamItem::File(file.name.clone()));
                    }
                },

                Statement::Group(files) =>
                {
                    let mut group = Group::new();
                    for file in files
                    {
                        group.add(StreamItem::File(file.name.clone()));
                    }
                    from_script.push(StreamItem::Group(group));
                },

                _ => ()
            }
        }

        for item in from_script
        {
            self.input_stream.push(item);
        }

        Ok(())
    }

    /* record an input file in the global list. append-only: records are
       never retracted once made */
    pub fn record_input(&mut self, file: InputFile)
    {
        self.inputs.push(file);
    }

    /* wind the run down: write the cross-reference report if asked for,
       remove a partial output on fatal unless overridden, and hand back
       the exit code. the caller writes the map itself, since the map
       needs the symbol table and the session doesn't hold it */
    pub fn finish(&self) -> i32
    {
        if self.config.cref
        {
            let mut out = std::io::stderr();
            let _ = self.cref.write_cref(&mut out);
        }

        if self.diag.has_fatal() && self.config.no_inhibit_exec == false
        {
            /* don't leave a partially-written executable behind */
            if std::path::Path::new(&self.config.output_file).is_file()
            {
                let _ = std::fs::remove_file(&self.config.output_file);
            }
        }

        self.diag.exit_code()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::emulate::Rv64Emulation;
    use crate::lang::Statement;

    fn quiet_session() -> LinkSession
    {
        let mut session = LinkSession::new(Config::new(), Box::new(Rv64Emulation));
        session.diag.silence();
        session
    }

    #[test]
    fn command_line_entry_wins_over_script()
    {
        let mut session = quiet_session();
        session.config.entry = Some(String::from("from_cmdline"));
        session.script.push(Statement::Entry(String::from("from_script")));

        session.finish_parse().unwrap();
        assert_eq!(session.config.entry.as_deref(), Some("from_cmdline"));
    }

    #[test]
    fn script_entry_used_when_unset()
    {
        let mut session = quiet_session();
        session.script.push(Statement::Entry(String::from("from_script")));

        session.finish_parse().unwrap();
        assert_eq!(session.config.entry.as_deref(), Some("from_script"));
    }

    #[test]
    fn script_groups_join_the_stream()
    {
        let mut session = quiet_session();
        session.script.push(Statement::Group(vec!
        [
            crate::lang::InputFile
            {
                name: String::from("libfoo.a"),
                from_archive: None,
                as_needed: false,
                group_member: true
            }
        ]));

        session.finish_parse().unwrap();
        let stream = session.stream();
        assert_eq!(stream.len(), 1);
        match &stream[0]
        {
            StreamItem::Group(group) => assert!(group.is_empty() == false),
            _ => unreachable!()
        }
    }
}
