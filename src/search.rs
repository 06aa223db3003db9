/* itsyld file finder
 *
 * resolves plain file names, -l library short-names and INCLUDE'd
 * scripts against the search directories collected from -L switches
 * and SEARCH_DIR statements.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use std::path::{Path, PathBuf};

/* search directories are tried in the order they were registered:
   scripts rely on earlier directories shadowing later ones */
#[derive(Clone)]
pub struct Paths
{
    paths: Vec<String>
}

impl Paths
{
    pub fn new() -> Paths { Paths { paths: Vec::new() } }

    pub fn add(&mut self, pathname: &str)
    {
        /* only add paths to directories, and only once */
        if Path::new(pathname).is_dir() && self.paths.iter().any(|p| p == pathname) == false
        {
            self.paths.push(String::from(pathname));
        }
    }

    /* get the full pathname for a file by checking the name as given
       and then each registered search path, or None if nothing matches */
    pub fn find_file(&self, filename: &str) -> Option<PathBuf>
    {
        /* can we just find this file without searching? */
        if Path::new(filename).is_file()
        {
            return Some(Path::new(filename).to_path_buf());
        }

        for prefix in &self.paths
        {
            let mut path = Path::new(&prefix).to_path_buf();
            path.push(filename);
            if path.as_path().is_file()
            {
                return Some(path);
            }
        }

        None /* nothing found! */
    }

    /* resolve a -l short-name: each search directory is tried for
       lib<name>.a and then lib<name>.rlib before moving on */
    pub fn find_library(&self, shortname: &str) -> Option<PathBuf>
    {
        for suffix in ["a", "rlib"].iter()
        {
            let filename = format!("lib{}.{}", shortname, suffix);
            if let Some(path) = self.find_file(&filename)
            {
                return Some(path);
            }
        }

        None
    }

    /* resolve a stream entry, whether a path or a -l short-name */
    pub fn resolve(&self, name: &str) -> Option<PathBuf>
    {
        match name.strip_prefix("-l")
        {
            Some(shortname) => self.find_library(shortname),
            None => self.find_file(name)
        }
    }
}
