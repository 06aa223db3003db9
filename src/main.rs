/* itsyld
 *
 * Minimalist static linker front end for 64-bit RISC-V (RV64) ELF files
 *
 * Syntax: itsyld [options] objects...
 *
 * It accepts the following binutils ld-compatible command-line arguments:
 *
 * -o <output>      Generate the linked ELF executable at <output> or a.out if not specified
 * -T <script>      Read the linker script <script> instead of the built-in one
 * -L <path>        Add <path> to the list of paths searched for files and -l libraries
 * -l <name>        Search for lib<name>.a (or .rlib) in the search paths
 * -m <emulation>   Select the target emulation (elf64lriscv)
 * -e <symbol>      Set the entry point symbol
 * -u <symbol>      Enter <symbol> into the link as undefined from the start
 * -y <symbol>      Report every file that defines or references <symbol>
 * --defsym <s>=<e> Define symbol <s> from expression <e>
 * --version-script <file>   Read symbol version nodes from <file>
 * -M, -Map <file>  Print the link map, or write it to <file>
 * --cref           Print a cross-reference table when the link completes
 * --start-group    Mark the start of a group of archives to rescan as a unit
 * --end-group      Mark the end of a group created by --start-group
 * --warn-common    Warn when common symbols are combined or overridden
 * --warn-once      Report each undefined symbol only once
 * --fatal-warnings Treat every warning as an error
 * --noinhibit-exec Keep the output file even if the link failed
 * --relax          Enable relocation shrinking (--no-relax to disable)
 * -d, -dc, -dp     Force space to be allocated for common symbols
 *
 * --help           Display minimal usage information
 * --version        Display version information
 *
 * Interspersed in the command line arguments are object and library files
 * to link together. Scripts use the ld-compatible script language:
 * SECTIONS, MEMORY, PHDRS, VERSION and the usual file-level commands.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

extern crate goblin;
extern crate wildmatch;
extern crate indexmap;

use std::io::Write;

mod cmd;     /* command-line parser */
mod session; /* centralize the state of one linking run */
mod diag;    /* diagnostics sink and error type */
mod search;  /* find files for the linking process */
mod lexer;   /* script tokenizer */
mod grammar; /* script, version-script and defsym parser */
mod expr;    /* expression trees and built-in functions */
mod lang;    /* statement and entity model */
mod version; /* symbol version nodes */
mod symtab;  /* global symbol table */
mod policy;  /* resolution policy engine */
mod ctor;    /* constructor and destructor sets */
mod cref;    /* cross-reference and map reporting */
mod emulate; /* target emulations */
mod driver;  /* walk the input stream and resolve symbols */

fn main()
{
    std::process::exit(run());
}

fn run() -> i32
{
    /* find out what needs to be done from command line arguments */
    let command_line = cmd::parse_args();

    let emulation_name = match &command_line.emulation
    {
        Some(name) => name.clone(),
        None => String::from("elf64lriscv")
    };

    let emulation = match emulate::select(&emulation_name)
    {
        Ok(emulation) => emulation,
        Err(error) =>
        {
            eprintln!("Error: {}", error);
            return 1;
        }
    };

    let mut session = session::LinkSession::new(command_line.config, emulation);

    for symbol in command_line.undefined
    {
        session.forced_undefined.push(symbol);
    }
    for symbol in command_line.trace
    {
        session.cref.watch(&symbol);
    }
    if session.config.cref || session.config.print_map || session.config.map_file.is_some()
    {
        session.cref.notice_all();
    }

    for item in command_line.stream
    {
        session.add_to_stream(item);
    }

    /* the script shapes everything else: -T names one, otherwise the
       emulation's built-in layout applies */
    let parsed = match session.config.script_file.clone()
    {
        Some(filename) => match std::fs::read_to_string(&filename)
        {
            Ok(text) => grammar::parse_script(&text, &filename, &mut session),
            Err(reason) => Err(diag::LinkError::new(
                format!("cannot read linker script {}: {}", filename, reason)))
        },
        None =>
        {
            let text = session.emulation.default_script();
            grammar::parse_script(text, "<built-in>", &mut session)
        }
    };

    if let Err(error) = parsed
    {
        session.diag.fatal(format!("{}", error));
        return session.finish();
    }

    /* --defsym fragments become assignments in the global scope */
    for defsym in session.config.defsyms.clone()
    {
        if let Err(error) = grammar::parse_defsym(&defsym, &mut session)
        {
            session.diag.fatal(format!("{}", error));
            return session.finish();
        }
    }

    if let Some(filename) = session.config.version_script_file.clone()
    {
        let parsed = match std::fs::read_to_string(&filename)
        {
            Ok(text) => grammar::parse_version_script(&text, &filename, &mut session),
            Err(reason) => Err(diag::LinkError::new(
                format!("cannot read version script {}: {}", filename, reason)))
        };

        if let Err(error) = parsed
        {
            session.diag.fatal(format!("{}", error));
            return session.finish();
        }
    }

    /* post-parse fix-up passes, then absorb the script's own settings
       and input files into the session */
    if let Err(error) = session.finish_parse()
    {
        session.diag.fatal(format!("{}", error));
        return session.finish();
    }

    /* walk the stream and resolve everything */
    let table = driver::run(&mut session);

    /* write the link map where it was asked for */
    if let Some(map_file) = session.config.map_file.clone()
    {
        match std::fs::File::create(&map_file)
        {
            Ok(mut out) =>
            {
                if let Err(reason) = write_map(&session, &table, &mut out)
                {
                    session.diag.fatal(format!("cannot write map file {}: {}", map_file, reason));
                }
            },
            Err(reason) => session.diag.fatal(format!("cannot create map file {}: {}", map_file, reason))
        }
    }

    if session.config.print_map
    {
        let mut out = std::io::stderr();
        let _ = write_map(&session, &table, &mut out);
    }

    session.finish()
}

/* the link map: archive members pulled in and why, then the defined
   symbols in observation order */
fn write_map(session: &session::LinkSession, table: &symtab::SymbolTable,
             out: &mut dyn Write) -> std::io::Result<()>
{
    session.cref.write_map(out)?;

    writeln!(out)?;
    writeln!(out, "Defined symbols")?;
    for (name, symbol) in table.iter()
    {
        if symbol.kind == symtab::SymbolKind::Defined
        {
            writeln!(out, "{:#018x} {} ({})", symbol.value, name,
                     symbol.object.as_deref().unwrap_or("?"))?;
        }
    }

    Ok(())
}
