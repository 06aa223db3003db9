/* itsyld diagnostics sink
 *
 * every component reports through here rather than printing and exiting
 * on the spot. fatal reports are remembered but do not stop the current
 * unit of work: the caller finishes its symbol or object first, so that
 * all outstanding problems are reported before the process winds down.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use std::fmt;

/* classification of a report. fatal reports doom the link but do not
   short-circuit it: diagnostics keep accumulating until the current
   pass completes */
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Severity
{
    Info,
    Warning,
    Fatal
}

/* where in a script something went wrong */
#[derive(Clone, PartialEq)]
pub struct Location
{
    pub file: String,
    pub line: usize
}

impl fmt::Display for Location
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/* an error that propagates up through Results rather than being printed
   deep inside the engine. parse errors always carry the script location */
#[derive(Clone, PartialEq)]
pub struct LinkError
{
    pub message: String,
    pub location: Option<Location>
}

impl LinkError
{
    pub fn new(message: String) -> LinkError
    {
        LinkError { message, location: None }
    }

    pub fn at(message: String, file: &str, line: usize) -> LinkError
    {
        LinkError
        {
            message,
            location: Some(Location { file: String::from(file), line })
        }
    }
}

impl fmt::Display for LinkError
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match &self.location
        {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message)
        }
    }
}

impl fmt::Debug for LinkError
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        fmt::Display::fmt(self, f)
    }
}

/* one recorded report */
pub struct Diagnostic
{
    pub severity: Severity,
    pub message: String
}

/* the single sink all reports flow through */
pub struct Diagnostics
{
    reports: Vec<Diagnostic>,
    fatal_raised: bool,
    fatal_warnings: bool,
    quiet: bool
}

impl Diagnostics
{
    pub fn new() -> Diagnostics
    {
        Diagnostics
        {
            reports: Vec::new(),
            fatal_raised: false,
            fatal_warnings: false,
            quiet: false
        }
    }

    /* when set, every warning is promoted to the fatal class */
    pub fn promote_warnings(&mut self)
    {
        self.fatal_warnings = true;
    }

    /* suppress terminal output, keeping the record. used by tests */
    pub fn silence(&mut self)
    {
        self.quiet = true;
    }

    pub fn info(&mut self, message: String)
    {
        self.report(Severity::Info, message);
    }

    pub fn warning(&mut self, message: String)
    {
        match self.fatal_warnings
        {
            true => self.report(Severity::Fatal, message),
            false => self.report(Severity::Warning, message)
        }
    }

    pub fn fatal(&mut self, message: String)
    {
        self.report(Severity::Fatal, message);
    }

    /* record a fatal condition that was already reported elsewhere,
       or that needs no message of its own (eg, an escalated undefined
       reference whose individual reports went out as warnings) */
    pub fn raise_fatal(&mut self)
    {
        self.fatal_raised = true;
    }

    fn report(&mut self, severity: Severity, message: String)
    {
        if severity == Severity::Fatal
        {
            self.fatal_raised = true;
        }

        if self.quiet == false
        {
            match severity
            {
                Severity::Info => eprintln!("{}", &message),
                Severity::Warning => eprintln!("Warning: {}", &message),
                Severity::Fatal => eprintln!("Error: {}", &message)
            }
        }

        self.reports.push(Diagnostic { severity, message });
    }

    pub fn has_fatal(&self) -> bool { self.fatal_raised }

    /* success only if nothing fatal was raised across the whole run */
    pub fn exit_code(&self) -> i32
    {
        match self.fatal_raised
        {
            true => 1,
            false => 0
        }
    }

    pub fn reports(&self) -> std::slice::Iter<'_, Diagnostic>
    {
        self.reports.iter()
    }

    /* count reports of the given class, used by tests and the map writer */
    pub fn count(&self, severity: Severity) -> usize
    {
        self.reports.iter().filter(|d| d.severity == severity).count()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fatal_defers_but_sticks()
    {
        let mut diag = Diagnostics::new();
        diag.silence();

        diag.warning(String::from("harmless"));
        assert_eq!(diag.exit_code(), 0);

        diag.fatal(String::from("doomed"));
        diag.info(String::from("still reporting"));
        assert!(diag.has_fatal());
        assert_eq!(diag.exit_code(), 1);
        assert_eq!(diag.reports().count(), 3);
    }

    #[test]
    fn fatal_warnings_promotes()
    {
        let mut diag = Diagnostics::new();
        diag.silence();
        diag.promote_warnings();

        diag.warning(String::from("no longer harmless"));
        assert!(diag.has_fatal());
        assert_eq!(diag.count(Severity::Fatal), 1);
        assert_eq!(diag.count(Severity::Warning), 0);
    }

    #[test]
    fn link_error_formats_location()
    {
        let err = LinkError::at(String::from("unexpected token"), "test.ld", 12);
        assert_eq!(format!("{}", err), "test.ld:12: unexpected token");
    }
}
