/* itsyld cross-reference and map reporting
 *
 * purely observational stores fed by the notice-tracing callback and
 * by archive-member admission. nothing here ever changes a resolution
 * outcome; the stores only exist so the map and cross-reference tables
 * can be written out at the end of the run.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use std::io::Write;
use std::collections::HashSet;
use indexmap::map::IndexMap;

/* definitions and references seen for one watched symbol */
pub struct CrefEntry
{
    pub defined_in: Vec<String>,
    pub referenced_from: Vec<String>
}

pub struct CrossReference
{
    notice_all: bool,
    watch: HashSet<String>,

    /* first-notice order is the order of the final table */
    entries: IndexMap<String, CrefEntry>,

    /* archive pulls with attribution, in admission order */
    pulls: Vec<String>
}

impl CrossReference
{
    pub fn new() -> CrossReference
    {
        CrossReference
        {
            notice_all: false,
            watch: HashSet::new(),
            entries: IndexMap::new(),
            pulls: Vec::new()
        }
    }

    /* record everything, for a full cross-reference table */
    pub fn notice_all(&mut self)
    {
        self.notice_all = true;
    }

    /* record only this name, for -y style symbol tracing */
    pub fn watch(&mut self, name: &str)
    {
        self.watch.insert(String::from(name));
    }

    pub fn wants(&self, name: &str) -> bool
    {
        self.notice_all || self.watch.contains(name)
    }

    pub fn record_definition(&mut self, name: &str, object: &str)
    {
        if self.wants(name)
        {
            self.entry(name).defined_in.push(String::from(object));
        }
    }

    pub fn record_reference(&mut self, name: &str, object: &str)
    {
        if self.wants(name)
        {
            self.entry(name).referenced_from.push(String::from(object));
        }
    }

    fn entry(&mut self, name: &str) -> &mut CrefEntry
    {
        self.entries.entry(String::from(name)).or_insert(CrefEntry
        {
            defined_in: Vec::new(),
            referenced_from: Vec::new()
        })
    }

    /* attribute an archive-member pull: which member was admitted, for
       which symbol, and who needed it */
    pub fn record_pull(&mut self, archive: &str, member: &str, symbol: &str, needed_by: &str)
    {
        self.pulls.push(format!("{}({}) pulled in for {} needed by {}",
                                archive, member, symbol, needed_by));
    }

    /* write the archive-member section of the map file */
    pub fn write_map(&self, out: &mut dyn Write) -> std::io::Result<()>
    {
        writeln!(out, "Archive member included because of file (symbol)")?;
        writeln!(out)?;
        for pull in &self.pulls
        {
            writeln!(out, "{}", pull)?;
        }

        Ok(())
    }

    /* write the full cross-reference table in first-notice order */
    pub fn write_cref(&self, out: &mut dyn Write) -> std::io::Result<()>
    {
        writeln!(out, "Cross Reference Table")?;
        writeln!(out)?;
        writeln!(out, "Symbol\tFile")?;

        for (name, entry) in &self.entries
        {
            for definer in &entry.defined_in
            {
                writeln!(out, "{}\t{}", name, definer)?;
            }
            for referencer in &entry.referenced_from
            {
                writeln!(out, "\t{}", referencer)?;
            }
        }

        Ok(())
    }

    pub fn pulls(&self) -> &[String] { &self.pulls }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn watch_list_filters_recording()
    {
        let mut cref = CrossReference::new();
        cref.watch("traced");

        cref.record_definition("traced", "a.o");
        cref.record_reference("traced", "b.o");
        cref.record_definition("untraced", "c.o");

        assert!(cref.entries.contains_key("traced"));
        assert!(cref.entries.contains_key("untraced") == false);
    }

    #[test]
    fn notice_all_records_everything()
    {
        let mut cref = CrossReference::new();
        cref.notice_all();
        cref.record_reference("anything", "a.o");
        assert!(cref.entries.contains_key("anything"));
    }

    #[test]
    fn cref_table_output_shape()
    {
        let mut cref = CrossReference::new();
        cref.notice_all();
        cref.record_definition("main", "main.o");
        cref.record_reference("main", "crt0.o");

        let mut buffer = Vec::new();
        cref.write_cref(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.contains("Cross Reference Table"));
        assert!(text.contains("main\tmain.o"));
        assert!(text.contains("\tcrt0.o"));
    }
}
