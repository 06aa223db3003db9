/* itsyld command-line parser
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::session::{ Config, Group, StreamItem };

/* use a state machine to analyze command line args */
enum State
{
    ExpectingAnything,
    ExpectingSearchPath,
    ExpectingOutputFile,
    ExpectingScriptFile,
    ExpectingLibrary,
    ExpectingEmulation,
    ExpectingEntrySymbol,
    ExpectingDefsym,
    ExpectingVersionScript,
    ExpectingMapFile,
    ExpectingUndefinedSymbol,
    ExpectingTraceSymbol
}

/* everything the command line decided, handed to main to build the
   session from: the switches, the emulation to select, the ordered
   input stream, and the symbol lists that seed resolution */
pub struct CommandLine
{
    pub config: Config,
    pub emulation: Option<String>,
    pub stream: Vec<StreamItem>,
    pub undefined: Vec<String>,     /* -u symbols, undefined from the start */
    pub trace: Vec<String>          /* -y symbols to report every sighting of */
}

impl CommandLine
{
    fn new() -> CommandLine
    {
        CommandLine
        {
            config: Config::new(),
            emulation: None,
            stream: Vec::new(),
            undefined: Vec::new(),
            trace: Vec::new()
        }
    }
}

/* convert command-line arguments into a native structure */
pub fn parse_args() -> CommandLine
{
    /* get the command-line arguments as a list of strings, skipping
    the first argument because it's just the program name */
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() == 0
    {
        /* no arguments? bail out with a message hinting at what we'd expect */
        usage_die();
    }

    parse(&args)
}

fn parse(args: &[String]) -> CommandLine
{
    let mut cmd = CommandLine::new();
    let mut state = State::ExpectingAnything;

    /* while a group is open, files and libraries collect here instead
       of going straight into the stream */
    let mut group: Option<Group> = None;

    for arg in args
    {
        match state
        {
            /* argument could be an input file or a switch. figure out
               which it is, and either change state to handle the switch
               or include the file in the processing stream */
            State::ExpectingAnything =>
            {
                /* -lfoo and -Ldir attach their value; -melf64lriscv too */
                if arg.len() > 2 && arg.starts_with("-l")
                {
                    add_input(&mut cmd, &mut group, StreamItem::Library(String::from(&arg[2..])));
                    continue;
                }
                if arg.len() > 2 && arg.starts_with("-L")
                {
                    cmd.stream.push(StreamItem::SearchPath(String::from(&arg[2..])));
                    continue;
                }
                if arg.len() > 2 && arg.starts_with("-m")
                {
                    cmd.emulation = Some(String::from(&arg[2..]));
                    continue;
                }

                match parse_single_arg(arg, &mut cmd, &mut group)
                {
                    (true, Some(s)) => state = s,
                    (false, None) => add_input(&mut cmd, &mut group, StreamItem::File(arg.clone())),
                    (_, _) => ()
                }
            },

            /* the argument is expected to be a search path */
            State::ExpectingSearchPath =>
            {
                cmd.stream.push(StreamItem::SearchPath(arg.clone()));
                state = State::ExpectingAnything;
            },

            /* the argument is expected to be the executable output filename */
            State::ExpectingOutputFile =>
            {
                cmd.config.output_file = arg.clone();
                state = State::ExpectingAnything;
            },

            /* the argument is expected to be the linker script filename */
            State::ExpectingScriptFile =>
            {
                cmd.config.script_file = Some(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingLibrary =>
            {
                add_input(&mut cmd, &mut group, StreamItem::Library(arg.clone()));
                state = State::ExpectingAnything;
            },

            State::ExpectingEmulation =>
            {
                cmd.emulation = Some(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingEntrySymbol =>
            {
                cmd.config.entry = Some(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingDefsym =>
            {
                cmd.config.defsyms.push(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingVersionScript =>
            {
                cmd.config.version_script_file = Some(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingMapFile =>
            {
                cmd.config.map_file = Some(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingUndefinedSymbol =>
            {
                cmd.undefined.push(arg.clone());
                state = State::ExpectingAnything;
            },

            State::ExpectingTraceSymbol =>
            {
                cmd.trace.push(arg.clone());
                state = State::ExpectingAnything;
            }
        }
    }

    /* a group left open at the end of the line is a usage error */
    if group.is_some()
    {
        unbalanced_group_die();
    }

    cmd
}

/* route an input file or library into the open group, or straight into
   the stream when no group is open */
fn add_input(cmd: &mut CommandLine, group: &mut Option<Group>, item: StreamItem)
{
    match group
    {
        Some(g) => g.add(item),
        None => cmd.stream.push(item)
    }
}

/* attempt to parse a single argument and return whether or not the arg
   was successfully parsed, and the new state of the parser. switches
   that need no value flip their settings here and leave the state alone */
fn parse_single_arg(arg: &String, cmd: &mut CommandLine, group: &mut Option<Group>) -> (bool, Option<State>)
{
    /* display minimal help and exit */
    if arg == "--help" { usage_die() }

    /* display version information */
    if arg == "--version" { version_die() }

    /* switches carrying their value after '=' */
    if let Some(value) = long_value(arg, "--defsym")
    {
        cmd.config.defsyms.push(value);
        return (true, None);
    }
    if let Some(value) = long_value(arg, "--version-script")
    {
        cmd.config.version_script_file = Some(value);
        return (true, None);
    }
    if let Some(value) = long_value(arg, "--entry")
    {
        cmd.config.entry = Some(value);
        return (true, None);
    }
    if let Some(value) = long_value(arg, "--undefined")
    {
        cmd.undefined.push(value);
        return (true, None);
    }
    if let Some(value) = long_value(arg, "--trace-symbol")
    {
        cmd.trace.push(value);
        return (true, None);
    }
    if let Some(value) = long_value(arg, "--script")
    {
        cmd.config.script_file = Some(value);
        return (true, None);
    }

    /* next command line argument must be a search path */
    if arg == "-L" || arg == "--library-path" { return (true, Some(State::ExpectingSearchPath)) }

    /* next command line argument must be an output file name */
    if arg == "-o" || arg == "--output" { return (true, Some(State::ExpectingOutputFile)) }

    /* next command line argument must be the script filename */
    if arg == "-T" { return (true, Some(State::ExpectingScriptFile)) }

    /* next command line argument must be a library name to search for */
    if arg == "-l" || arg == "--library" { return (true, Some(State::ExpectingLibrary)) }

    /* next command line argument selects the emulation */
    if arg == "-m" { return (true, Some(State::ExpectingEmulation)) }

    if arg == "-e" { return (true, Some(State::ExpectingEntrySymbol)) }
    if arg == "--defsym" { return (true, Some(State::ExpectingDefsym)) }
    if arg == "--version-script" { return (true, Some(State::ExpectingVersionScript)) }
    if arg == "-Map" { return (true, Some(State::ExpectingMapFile)) }
    if arg == "-u" || arg == "--undefined" { return (true, Some(State::ExpectingUndefinedSymbol)) }
    if arg == "-y" || arg == "--trace-symbol" { return (true, Some(State::ExpectingTraceSymbol)) }

    /* flags that just flip a setting */
    if arg == "-M" || arg == "--print-map" { cmd.config.print_map = true; return (true, None) }
    if arg == "--cref" { cmd.config.cref = true; return (true, None) }
    if arg == "--warn-common" { cmd.config.warn_common = true; return (true, None) }
    if arg == "--warn-once" { cmd.config.warn_once = true; return (true, None) }
    if arg == "--warn-constructors" { cmd.config.warn_constructors = true; return (true, None) }
    if arg == "--fatal-warnings" { cmd.config.fatal_warnings = true; return (true, None) }
    if arg == "--noinhibit-exec" { cmd.config.no_inhibit_exec = true; return (true, None) }
    if arg == "--relax" { cmd.config.relax = true; return (true, None) }
    if arg == "--no-relax" { cmd.config.relax = false; return (true, None) }

    /* -d, -dc and -dp all force space to be allocated for commons */
    if arg == "-d" || arg == "-dc" || arg == "-dp"
    {
        cmd.config.force_common_allocation = true;
        return (true, None);
    }

    /* open a group of archives to rescan as a unit */
    if arg == "--start-group" || arg == "-("
    {
        if group.is_some() { unbalanced_group_die() }
        *group = Some(Group::new());
        return (true, None);
    }

    /* close the group and commit it to the stream */
    if arg == "--end-group" || arg == "-)"
    {
        match group.take()
        {
            Some(g) => cmd.stream.push(StreamItem::Group(g)),
            None => unbalanced_group_die()
        }
        return (true, None);
    }

    /* ignore requests to garbage collect sections: we'll do that automatically */
    if arg == "--gc-sections" { return (true, None) }

    /* ignore requests for static and dynamic: static linking is all we do */
    if arg == "-Bstatic" { return (true, None) }
    if arg == "-Bdynamic" { return (true, None) }
    if arg == "-static" { return (true, None) }
    if arg == "-nostdlib" { return (true, None) }

    /* an unrecognized switch is a usage error; a file name falls through */
    if arg.starts_with('-') { unknown_switch_die(arg) }

    return (false, None) /* nothing handled and no change to state */
}

/* match "--switch=value" forms, returning the value */
fn long_value(arg: &str, switch: &str) -> Option<String>
{
    let rest = arg.strip_prefix(switch)?;
    let value = rest.strip_prefix('=')?;
    Some(String::from(value))
}

/* software information and error messages */
fn version_die() -> !
{
    eprintln!("itsyld {} by {}", env!("CARGO_PKG_VERSION"), env!("CARGO_PKG_AUTHORS"));
    std::process::exit(1);
}

fn usage_die() -> !
{
    eprintln!("Usage: {} [options] <file>...", env!("CARGO_BIN_NAME"));
    eprintln!("  -o FILE              write output to FILE (default a.out)");
    eprintln!("  -T FILE              read FILE as the linker script");
    eprintln!("  -L DIR               add DIR to the library search path");
    eprintln!("  -l NAME              search for library NAME");
    eprintln!("  -m EMULATION         select the target emulation");
    eprintln!("  -e SYMBOL            set the entry point");
    eprintln!("  -u SYMBOL            start with SYMBOL undefined");
    eprintln!("  -y SYMBOL            report every file mentioning SYMBOL");
    eprintln!("  --defsym SYM=EXPR    define SYM from an expression");
    eprintln!("  --version-script F   read symbol version nodes from F");
    eprintln!("  -M, -Map FILE        print or write the link map");
    eprintln!("  --cref               print a cross-reference table");
    eprintln!("  --start-group ...    rescan the enclosed archives --end-group");
    std::process::exit(1);
}

fn unbalanced_group_die() -> !
{
    eprintln!("mismatched --start-group/--end-group");
    std::process::exit(1);
}

fn unknown_switch_die(arg: &str) -> !
{
    eprintln!("unrecognized option '{}'", arg);
    std::process::exit(1);
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn args(list: &[&str]) -> Vec<String>
    {
        list.iter().map(|a| String::from(*a)).collect()
    }

    #[test]
    fn files_switches_and_groups()
    {
        let cmd = parse(&args(&
        [
            "-o", "kernel.elf", "-melf64lriscv", "-L/opt/lib",
            "crt0.o", "--start-group", "-lfoo", "bar.a", "--end-group",
            "--defsym", "base=0x1000", "-u", "main", "--cref"
        ]));

        assert_eq!(cmd.config.output_file, "kernel.elf");
        assert_eq!(cmd.emulation.as_deref(), Some("elf64lriscv"));
        assert_eq!(cmd.config.defsyms, vec![String::from("base=0x1000")]);
        assert_eq!(cmd.undefined, vec![String::from("main")]);
        assert!(cmd.config.cref);

        assert_eq!(cmd.stream.len(), 3);
        match &cmd.stream[0]
        {
            StreamItem::SearchPath(p) => assert_eq!(p, "/opt/lib"),
            _ => unreachable!()
        }
        match &cmd.stream[1]
        {
            StreamItem::File(f) => assert_eq!(f, "crt0.o"),
            _ => unreachable!()
        }
        match &cmd.stream[2]
        {
            StreamItem::Group(g) => assert_eq!(g.iter().count(), 2),
            _ => unreachable!()
        }
    }

    #[test]
    fn long_switches_with_values()
    {
        let cmd = parse(&args(&
        [
            "--entry=boot", "--version-script=vers.map",
            "--undefined=keep_me", "--warn-common", "--fatal-warnings"
        ]));

        assert_eq!(cmd.config.entry.as_deref(), Some("boot"));
        assert_eq!(cmd.config.version_script_file.as_deref(), Some("vers.map"));
        assert_eq!(cmd.undefined, vec![String::from("keep_me")]);
        assert!(cmd.config.warn_common);
        assert!(cmd.config.fatal_warnings);
    }

    #[test]
    fn map_switches()
    {
        let cmd = parse(&args(&["-M", "-Map", "out.map"]));
        assert!(cmd.config.print_map);
        assert_eq!(cmd.config.map_file.as_deref(), Some("out.map"));
    }
}
