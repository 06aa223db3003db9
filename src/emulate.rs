/* itsyld target emulation
 *
 * target-specific behavior behind one trait object: the built-in script
 * used when no -T script is given, the output architecture, the symbol
 * name prefix convention, and where orphan sections land. an emulation
 * is selected once at start-up and held by the link session for the
 * rest of the run.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::diag::LinkError;

use wildmatch::WildMatch;

pub trait Emulation
{
    fn name(&self) -> &'static str;

    /* script text parsed when the command line supplies none */
    fn default_script(&self) -> &'static str;

    fn output_arch(&self) -> &'static str;

    /* the character prepended to well-known set symbols, if the target's
       symbol naming convention wants one */
    fn symbol_prefix(&self) -> Option<char>;

    /* pick the output section an orphan input section should join, or
       None to let the generic fallback append it at the end */
    fn place_orphan(&self, section: &str) -> Option<&'static str>;
}

/* 64-bit RISC-V, the only target we ship. other emulations slot in as
   further implementations of the trait */
pub struct Rv64Emulation;

/* the built-in layout: standard output sections in the usual order,
   collecting the section names RISC-V toolchains emit */
const RV64_DEFAULT_SCRIPT: &str = r#"
ENTRY(_start)
SECTIONS
{
    .text   : { *(.entry*) *(.init*) *(.text*) }
    .rodata : { *(.rodata*) }
    .data   : { *(.data*) *(.sdata*) }
    .bss    : { *(.bss*) *(.sbss*) *(COMMON) }
}
"#;

/* orphan sections are grouped into the standard output section whose
   input patterns they resemble */
const RV64_ORPHAN_HOMES: [(&str, &str); 6] =
[
    (".text*",   ".text"),
    (".rodata*", ".rodata"),
    (".data*",   ".data"),
    (".sdata*",  ".data"),
    (".bss*",    ".bss"),
    (".sbss*",   ".bss")
];

impl Emulation for Rv64Emulation
{
    fn name(&self) -> &'static str { "elf64lriscv" }

    fn default_script(&self) -> &'static str { RV64_DEFAULT_SCRIPT }

    fn output_arch(&self) -> &'static str { "riscv64" }

    /* ELF symbols carry no prefix */
    fn symbol_prefix(&self) -> Option<char> { None }

    fn place_orphan(&self, section: &str) -> Option<&'static str>
    {
        for (pattern, home) in RV64_ORPHAN_HOMES.iter()
        {
            if WildMatch::new(pattern).matches(section)
            {
                return Some(home);
            }
        }

        None
    }
}

/* look up an emulation by name, as given by -m on the command line */
pub fn select(name: &str) -> Result<Box<dyn Emulation>, LinkError>
{
    match name
    {
        "elf64lriscv" => Ok(Box::new(Rv64Emulation)),
        other => Err(LinkError::new(format!("unsupported emulation {}", other)))
    }
}
