/* itsyld statement and entity model
 *
 * the typed tree a parsed script turns into: statements, output-section
 * descriptions, wildcard input-section selectors, memory regions and
 * program-header descriptors. statements form ordered lists per scope,
 * the global list or an output section's child list, and ownership is
 * strictly hierarchical. everything built here lives until the process
 * exits; nothing is ever retracted from the model.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::expr::{ AssignOp, Expression };
use super::diag::LinkError;

use wildmatch::WildMatch;

/* how an output section is treated by the address-assignment pass */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SectionKind
{
    Normal,
    NoLoad,
    Dsect,
    Copy,
    Info,
    Overlay
}

/* constraints a section must satisfy before it may become non-empty */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Constraint
{
    None,
    OnlyIfRo,
    OnlyIfRw,
    Special
}

/* the order matched input sections are appended to their output section */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortMode
{
    None,
    ByName,
    ByAlignment,
    ByNameThenAlignment,
    ByAlignmentThenName
}

/* one name pattern: a literal, or a glob with '*' and '?'. exclusions
   are file-name patterns checked, in order, before the primary pattern */
#[derive(Clone, PartialEq, Debug)]
pub struct WildcardSpec
{
    pub pattern: String,
    pub sort: SortMode,
    pub exclude: Vec<String>
}

impl WildcardSpec
{
    pub fn plain(pattern: &str) -> WildcardSpec
    {
        WildcardSpec
        {
            pattern: String::from(pattern),
            sort: SortMode::None,
            exclude: Vec::new()
        }
    }

    /* does this spec accept the given section from the given file?
       the exclusion list knocks out files before the pattern is tried */
    pub fn matches(&self, file: &str, name: &str) -> bool
    {
        for excluded in &self.exclude
        {
            if WildMatch::new(excluded).matches(file)
            {
                return false;
            }
        }

        WildMatch::new(&self.pattern).matches(name)
    }
}

/* a wildcard input-section selector: which files contribute, and an
   ordered list of section patterns tried first-match-wins */
#[derive(Clone, PartialEq, Debug)]
pub struct InputSectionSelector
{
    pub file: WildcardSpec,
    pub sections: Vec<WildcardSpec>,
    pub keep: bool  /* survives section garbage collection */
}

/* a candidate handed to the selector by the layout pass */
#[derive(Clone, PartialEq, Debug)]
pub struct SectionCandidate
{
    pub file: String,
    pub section: String,
    pub alignment: u64
}

impl InputSectionSelector
{
    /* decide which candidates this selector claims, and in what order
       they are appended to the output section. candidates are tried
       against the section patterns in order and the first match wins;
       each pattern's sort mode then orders the sections it claimed.
       candidates arrive in object-supply order, and a stable sort keeps
       that order wherever no sort is requested */
    pub fn arrange(&self, candidates: &[SectionCandidate]) -> Vec<usize>
    {
        let file_pattern = WildMatch::new(&self.file.pattern);
        let mut claimed: Vec<Option<usize>> = vec![None; candidates.len()];

        for (candidate_idx, candidate) in candidates.iter().enumerate()
        {
            if file_pattern.matches(&candidate.file) == false
            {
                continue;
            }

            for (spec_idx, spec) in self.sections.iter().enumerate()
            {
                if spec.matches(&candidate.file, &candidate.section)
                {
                    claimed[candidate_idx] = Some(spec_idx);
                    break; /* first match wins */
                }
            }
        }

        /* append each pattern's claims in turn, sorted per its mode */
        let mut arranged = Vec::new();
        for spec_idx in 0..self.sections.len()
        {
            let mut group: Vec<usize> = (0..candidates.len())
                .filter(|i| claimed[*i] == Some(spec_idx))
                .collect();

            sort_candidates(&mut group, candidates, self.sections[spec_idx].sort);
            arranged.append(&mut group);
        }

        arranged
    }
}

/* stable-sort a group of candidate indices per the requested mode */
fn sort_candidates(group: &mut Vec<usize>, candidates: &[SectionCandidate], mode: SortMode)
{
    match mode
    {
        SortMode::None => (),

        SortMode::ByName =>
            group.sort_by(|a, b| candidates[*a].section.cmp(&candidates[*b].section)),

        /* alignment sorts are descending so the strictest goes first */
        SortMode::ByAlignment =>
            group.sort_by(|a, b| candidates[*b].alignment.cmp(&candidates[*a].alignment)),

        SortMode::ByNameThenAlignment =>
            group.sort_by(|a, b| candidates[*a].section.cmp(&candidates[*b].section)
                .then(candidates[*b].alignment.cmp(&candidates[*a].alignment))),

        SortMode::ByAlignmentThenName =>
            group.sort_by(|a, b| candidates[*b].alignment.cmp(&candidates[*a].alignment)
                .then(candidates[*a].section.cmp(&candidates[*b].section)))
    }
}

/* sizes for in-section data directives */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataSize
{
    Byte,
    Short,
    Long,
    Quad,
    SQuad
}

/* a symbol assignment statement. assignments appear once per statement
   terminator; PROVIDE only takes effect if the symbol is referenced */
#[derive(Clone, PartialEq, Debug)]
pub struct Assignment
{
    pub symbol: String,
    pub op: AssignOp,
    pub value: Expression,
    pub provide: bool,
    pub hidden: bool
}

/* one output section: header, body and trailer of the script statement */
#[derive(Clone, PartialEq, Debug)]
pub struct OutputSection
{
    pub name: String,
    pub address: Option<Expression>,
    pub kind: SectionKind,
    pub align: Option<Expression>,
    pub subalign: Option<Expression>,
    pub load_address: Option<Expression>,
    pub region: Option<String>,
    pub lma_region: Option<String>,
    pub fill: Option<Expression>,
    pub constraint: Constraint,

    /* phdr names are forward references: recorded as written during the
       parse and resolved to indices by a fix-up pass once the PHDRS
       block has been seen */
    pub phdrs: Vec<String>,
    pub phdr_indices: Vec<usize>,

    pub children: Vec<Statement>,

    /* overlays move the location counter past the largest member once
       the members themselves were laid out at a shared address */
    pub update_dot: Option<Expression>
}

impl OutputSection
{
    pub fn new(name: &str) -> OutputSection
    {
        OutputSection
        {
            name: String::from(name),
            address: None,
            kind: SectionKind::Normal,
            align: None,
            subalign: None,
            load_address: None,
            region: None,
            lma_region: None,
            fill: None,
            constraint: Constraint::None,
            phdrs: Vec::new(),
            phdr_indices: Vec::new(),
            children: Vec::new(),
            update_dot: None
        }
    }
}

/* an input file recorded in the global list, whether named on the
   command line, in a script, or pulled from an archive by resolution */
#[derive(Clone, PartialEq, Debug)]
pub struct InputFile
{
    pub name: String,
    pub from_archive: Option<String>,   /* archive path for pulled members */
    pub as_needed: bool,
    pub group_member: bool
}

/* the statement sum type. a list of these is one scope; output sections
   own their children outright */
#[derive(Clone, PartialEq, Debug)]
pub enum Statement
{
    Assignment(Assignment),
    Assert { condition: Expression, message: String },
    InputSections(InputSectionSelector),
    OutputSection(OutputSection),
    MemoryRegionRef(String),
    Data { size: DataSize, value: Expression },
    Fill { pattern: Expression },
    Target(String),
    Output(String),
    OutputFormat(Vec<String>),
    OutputArch(String),
    Entry(String),
    SearchDir(String),
    Startup(String),
    Map(String),
    Nocrossrefs(Vec<String>),
    Extern(Vec<String>),
    ForceCommonAllocation,
    InputFiles(Vec<InputFile>),
    Group(Vec<InputFile>),

    /* created by collaborators after parsing, never by the grammar:
       a concrete input section placed into an output section, padding
       inserted by address assignment, and relocation statements */
    InputSection { file: String, section: String },
    Padding { size: u64, fill: Option<Expression> },
    Reloc { howto: String, symbol: String, addend: Expression },

    /* CREATE_OBJECT_SYMBOLS and CONSTRUCTORS markers */
    ObjectSymbols,
    Constructors { sorted: bool }
}

/* memory region allocation-eligibility flags, set from the attribute
   string in a MEMORY block */
pub const REGION_READ: u32 = 1 << 0;    /* R: read-only sections        */
pub const REGION_WRITE: u32 = 1 << 1;   /* W: read/write data           */
pub const REGION_EXEC: u32 = 1 << 2;    /* X: executable code           */
pub const REGION_ALLOC: u32 = 1 << 3;   /* A: allocated sections        */
pub const REGION_LOAD: u32 = 1 << 4;    /* I, L: initialized sections   */

/* a named address range sections can be bound to */
#[derive(Clone, PartialEq, Debug)]
pub struct MemoryRegion
{
    pub name: String,
    pub origin: Expression,
    pub length: Expression,
    pub current: u64,           /* allocation cursor, driven externally */
    pub flags: u32,             /* a section must carry one of these    */
    pub not_flags: u32,         /* a section must carry none of these   */
    pub had_full_message: bool  /* region-full warned once already      */
}

impl MemoryRegion
{
    /* set the required/forbidden masks from an attribute string. '!'
       switches which mask subsequent characters accumulate into, and
       switches back if it appears again */
    pub fn set_attributes(&mut self, attributes: &str, file: &str, line: usize) -> Result<(), LinkError>
    {
        self.flags = 0;
        self.not_flags = 0;
        let mut inverted = false;

        for c in attributes.chars()
        {
            let bit = match c
            {
                '!' =>
                {
                    inverted = !inverted;
                    continue;
                },
                'R' | 'r' => REGION_READ,
                'W' | 'w' => REGION_WRITE,
                'X' | 'x' => REGION_EXEC,
                'A' | 'a' => REGION_ALLOC,
                'I' | 'i' | 'L' | 'l' => REGION_LOAD,
                other => return Err(LinkError::at(
                    format!("invalid attribute '{}' for memory region {}", other, self.name),
                    file, line))
            };

            match inverted
            {
                false => self.flags |= bit,
                true => self.not_flags |= bit
            }
        }

        Ok(())
    }
}

/* the ordered list of regions, looked up by name and created lazily on
   first reference. an unknown region defaults to the whole address
   space so sections without a region still lay out somewhere sensible */
pub struct MemoryRegions
{
    list: Vec<MemoryRegion>
}

impl MemoryRegions
{
    pub fn new() -> MemoryRegions
    {
        MemoryRegions { list: Vec::new() }
    }

    pub fn lookup(&mut self, name: &str) -> &mut MemoryRegion
    {
        if let Some(idx) = self.list.iter().position(|r| r.name == name)
        {
            return &mut self.list[idx];
        }

        self.list.push(MemoryRegion
        {
            name: String::from(name),
            origin: Expression::Value(0),
            length: Expression::Value(!0),
            current: 0,
            flags: 0,
            not_flags: 0,
            had_full_message: false
        });

        let last = self.list.len() - 1;
        &mut self.list[last]
    }

    pub fn find(&self, name: &str) -> Option<&MemoryRegion>
    {
        self.list.iter().find(|r| r.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MemoryRegion>
    {
        self.list.iter()
    }
}

/* the fixed ELF segment types recognized in a PHDRS block. any other
   symbolic type becomes a symbol-reference expression: whether it means
   anything is the evaluator's problem, not the parser's */
pub fn phdr_type_value(name: &str) -> Option<u64>
{
    match name
    {
        "PT_NULL"    => Some(0),
        "PT_LOAD"    => Some(1),
        "PT_DYNAMIC" => Some(2),
        "PT_INTERP"  => Some(3),
        "PT_NOTE"    => Some(4),
        "PT_SHLIB"   => Some(5),
        "PT_PHDR"    => Some(6),
        "PT_TLS"     => Some(7),
        _ => None
    }
}

/* one program header descriptor from a PHDRS block */
#[derive(Clone, PartialEq, Debug)]
pub struct ProgramHeader
{
    pub name: String,
    pub header_type: Expression,
    pub filehdr: bool,          /* segment includes the file header         */
    pub phdrs: bool,            /* segment includes the program header table */
    pub at: Option<Expression>,
    pub flags: Option<Expression>
}

/* the ordered descriptor list; declaration order is output order */
pub struct ProgramHeaders
{
    list: Vec<ProgramHeader>
}

impl ProgramHeaders
{
    pub fn new() -> ProgramHeaders
    {
        ProgramHeaders { list: Vec::new() }
    }

    pub fn add(&mut self, phdr: ProgramHeader)
    {
        self.list.push(phdr);
    }

    pub fn lookup_index(&self, name: &str) -> Option<usize>
    {
        self.list.iter().position(|p| p.name == name)
    }

    pub fn get(&self, idx: usize) -> Option<&ProgramHeader>
    {
        self.list.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProgramHeader>
    {
        self.list.iter()
    }

    pub fn len(&self) -> usize { self.list.len() }
}

/* fix up the phdr names recorded in output-section trailers into
   indices in the descriptor list, now that every PHDRS block has been
   parsed. a name with no descriptor is a lookup failure, and fatal */
pub fn resolve_phdr_references(statements: &mut [Statement], phdrs: &ProgramHeaders) -> Result<(), LinkError>
{
    for statement in statements.iter_mut()
    {
        if let Statement::OutputSection(section) = statement
        {
            section.phdr_indices.clear();
            for name in &section.phdrs
            {
                match phdrs.lookup_index(name)
                {
                    Some(idx) => section.phdr_indices.push(idx),
                    None => return Err(LinkError::new(
                        format!("section {} assigned to unknown program header {}", section.name, name)))
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn candidates() -> Vec<SectionCandidate>
    {
        vec!
        [
            SectionCandidate { file: String::from("b.o"), section: String::from(".text.cold"), alignment: 4 },
            SectionCandidate { file: String::from("a.o"), section: String::from(".text.hot"), alignment: 16 },
            SectionCandidate { file: String::from("a.o"), section: String::from(".text.aa"), alignment: 8 },
            SectionCandidate { file: String::from("c.o"), section: String::from(".data"), alignment: 8 }
        ]
    }

    #[test]
    fn first_match_wins_in_supply_order()
    {
        /* no sort requested: matched sections stay in object-supply order */
        let selector = InputSectionSelector
        {
            file: WildcardSpec::plain("*"),
            sections: vec![ WildcardSpec::plain(".text.*") ],
            keep: false
        };

        let order = selector.arrange(&candidates());
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn sort_by_name_is_lexicographic()
    {
        let mut spec = WildcardSpec::plain(".text.*");
        spec.sort = SortMode::ByName;
        let selector = InputSectionSelector
        {
            file: WildcardSpec::plain("*"),
            sections: vec![ spec ],
            keep: false
        };

        /* .text.aa < .text.cold < .text.hot regardless of supply order */
        let order = selector.arrange(&candidates());
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn sort_by_alignment_is_descending()
    {
        let mut spec = WildcardSpec::plain(".text.*");
        spec.sort = SortMode::ByAlignment;
        let selector = InputSectionSelector
        {
            file: WildcardSpec::plain("*"),
            sections: vec![ spec ],
            keep: false
        };

        let order = selector.arrange(&candidates());
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn exclusions_checked_before_pattern()
    {
        let mut spec = WildcardSpec::plain(".text.*");
        spec.exclude.push(String::from("a.o"));
        let selector = InputSectionSelector
        {
            file: WildcardSpec::plain("*"),
            sections: vec![ spec ],
            keep: false
        };

        let order = selector.arrange(&candidates());
        assert_eq!(order, vec![0]);
    }

    #[test]
    fn memory_regions_created_lazily()
    {
        let mut regions = MemoryRegions::new();
        assert!(regions.find("ram").is_none());

        let region = regions.lookup("ram");
        assert_eq!(region.length, Expression::Value(!0));
        region.current = 0x1000;

        /* second lookup finds the same region, not a fresh one */
        assert_eq!(regions.lookup("ram").current, 0x1000);
        assert_eq!(regions.iter().count(), 1);
    }

    #[test]
    fn region_attribute_masks()
    {
        let mut regions = MemoryRegions::new();
        let region = regions.lookup("rom");

        region.set_attributes("rx!w", "test.ld", 1).unwrap();
        assert_eq!(region.flags, REGION_READ | REGION_EXEC);
        assert_eq!(region.not_flags, REGION_WRITE);

        assert!(region.set_attributes("z", "test.ld", 2).is_err());
    }

    #[test]
    fn phdr_forward_references_fix_up()
    {
        let mut phdrs = ProgramHeaders::new();
        phdrs.add(ProgramHeader
        {
            name: String::from("text"),
            header_type: Expression::Value(1),
            filehdr: true,
            phdrs: true,
            at: None,
            flags: None
        });

        let mut section = OutputSection::new(".text");
        section.phdrs.push(String::from("text"));
        let mut statements = vec![ Statement::OutputSection(section) ];

        resolve_phdr_references(&mut statements, &phdrs).unwrap();
        match &statements[0]
        {
            Statement::OutputSection(s) => assert_eq!(s.phdr_indices, vec![0]),
            _ => unreachable!()
        }

        /* an unknown name is a hard failure */
        let mut bad = OutputSection::new(".data");
        bad.phdrs.push(String::from("nonesuch"));
        let mut statements = vec![ Statement::OutputSection(bad) ];
        assert!(resolve_phdr_references(&mut statements, &phdrs).is_err());
    }
}
