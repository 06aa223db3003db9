/* itsyld symbol version nodes
 *
 * a version script names sets of global/local visibility patterns,
 * optionally tagged and depending on earlier tags. dependencies may
 * reference tags declared later in the file, so the parser records
 * names only and an end-of-file pass resolves them to node indices.
 *
 * (c) Chris Williams, 2021.
 *
 * See LICENSE for usage and copying.
 */

use super::diag::LinkError;

use wildmatch::WildMatch;

/* the source language a pattern's names are written in. patterns inside
   an extern "lang" block carry that block's language; everything else
   defaults to the script's base language, C */
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Language
{
    C,
    Cplusplus,
    Java
}

impl Language
{
    pub fn from_name(name: &str) -> Option<Language>
    {
        match name
        {
            "C" => Some(Language::C),
            "C++" => Some(Language::Cplusplus),
            "Java" => Some(Language::Java),
            _ => None
        }
    }
}

/* one visibility pattern: a literal symbol name or a glob */
#[derive(Clone, PartialEq, Debug)]
pub struct VersionPattern
{
    pub pattern: String,
    pub language: Language,
    pub is_glob: bool  /* contains wildcard characters, so match not compare */
}

impl VersionPattern
{
    pub fn new(pattern: &str, language: Language) -> VersionPattern
    {
        VersionPattern
        {
            pattern: String::from(pattern),
            language,
            is_glob: pattern.contains('*') || pattern.contains('?') || pattern.contains('[')
        }
    }

    pub fn matches(&self, symbol: &str) -> bool
    {
        match self.is_glob
        {
            true => WildMatch::new(&self.pattern).matches(symbol),
            false => self.pattern == symbol
        }
    }
}

/* one version node: the anonymous node has no tag and may appear at
   most once, always processed first */
#[derive(Clone, PartialEq, Debug)]
pub struct VersionNode
{
    pub tag: Option<String>,
    pub globals: Vec<VersionPattern>,
    pub locals: Vec<VersionPattern>,

    /* dependency tags as written, and their node indices once resolved */
    pub deps: Vec<String>,
    pub dep_indices: Vec<usize>
}

impl VersionNode
{
    pub fn new(tag: Option<String>) -> VersionNode
    {
        VersionNode
        {
            tag,
            globals: Vec::new(),
            locals: Vec::new(),
            deps: Vec::new(),
            dep_indices: Vec::new()
        }
    }
}

/* every version node registered by the script, in declaration order
   except that an anonymous node is moved to the front */
pub struct VersionTree
{
    nodes: Vec<VersionNode>
}

impl VersionTree
{
    pub fn new() -> VersionTree
    {
        VersionTree { nodes: Vec::new() }
    }

    /* register a parsed node. tag clashes and a second anonymous node
       are rejected; dependency names are checked later, not here, to
       allow forward references */
    pub fn register(&mut self, node: VersionNode) -> Result<(), LinkError>
    {
        match &node.tag
        {
            None =>
            {
                if self.nodes.iter().any(|n| n.tag.is_none())
                {
                    return Err(LinkError::new(
                        String::from("anonymous version tag may only appear once")));
                }

                /* the anonymous node is processed before any tagged one */
                self.nodes.insert(0, node);
            },
            Some(tag) =>
            {
                if self.nodes.iter().any(|n| n.tag.as_deref() == Some(tag.as_str()))
                {
                    return Err(LinkError::new(format!("duplicate version tag {}", tag)));
                }

                self.nodes.push(node);
            }
        }

        Ok(())
    }

    /* end-of-file fix-up: turn recorded dependency tags into node
       indices. an undeclared tag is a resolution conflict */
    pub fn resolve_dependencies(&mut self) -> Result<(), LinkError>
    {
        let mut resolved: Vec<Vec<usize>> = Vec::new();

        for node in &self.nodes
        {
            let mut indices = Vec::new();
            for dep in &node.deps
            {
                match self.nodes.iter().position(|n| n.tag.as_deref() == Some(dep.as_str()))
                {
                    Some(idx) => indices.push(idx),
                    None => return Err(LinkError::new(
                        format!("version node depends on undefined tag {}", dep)))
                }
            }
            resolved.push(indices);
        }

        for (node, indices) in self.nodes.iter_mut().zip(resolved)
        {
            node.dep_indices = indices;
        }

        Ok(())
    }

    /* find the first node claiming the symbol as global or local */
    pub fn classify(&self, symbol: &str) -> Option<(usize, bool)>
    {
        for (idx, node) in self.nodes.iter().enumerate()
        {
            if node.globals.iter().any(|p| p.matches(symbol))
            {
                return Some((idx, true));
            }
            if node.locals.iter().any(|p| p.matches(symbol))
            {
                return Some((idx, false));
            }
        }

        None
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VersionNode>
    {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize { self.nodes.len() }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn anonymous_node_goes_first_and_only_once()
    {
        let mut tree = VersionTree::new();
        tree.register(VersionNode::new(Some(String::from("V1")))).unwrap();
        tree.register(VersionNode::new(None)).unwrap();

        assert_eq!(tree.iter().next().unwrap().tag, None);
        assert!(tree.register(VersionNode::new(None)).is_err());
    }

    #[test]
    fn forward_dependencies_resolve_at_end_of_file()
    {
        let mut tree = VersionTree::new();

        /* V1 depends on V2, declared after it */
        let mut v1 = VersionNode::new(Some(String::from("V1")));
        v1.deps.push(String::from("V2"));
        tree.register(v1).unwrap();
        tree.register(VersionNode::new(Some(String::from("V2")))).unwrap();

        tree.resolve_dependencies().unwrap();
        assert_eq!(tree.iter().next().unwrap().dep_indices, vec![1]);
    }

    #[test]
    fn undeclared_dependency_is_an_error()
    {
        let mut tree = VersionTree::new();
        let mut v1 = VersionNode::new(Some(String::from("V1")));
        v1.deps.push(String::from("NONESUCH"));
        tree.register(v1).unwrap();

        assert!(tree.resolve_dependencies().is_err());
    }

    #[test]
    fn patterns_match_globs_and_literals()
    {
        let literal = VersionPattern::new("exact_name", Language::C);
        assert!(literal.matches("exact_name"));
        assert!(literal.matches("exact_name_not") == false);

        let glob = VersionPattern::new("std_*", Language::Cplusplus);
        assert!(glob.is_glob);
        assert!(glob.matches("std_vector"));
    }

    #[test]
    fn classification_prefers_earlier_nodes()
    {
        let mut tree = VersionTree::new();

        let mut v1 = VersionNode::new(Some(String::from("V1")));
        v1.globals.push(VersionPattern::new("api_*", Language::C));
        tree.register(v1).unwrap();

        let mut v2 = VersionNode::new(Some(String::from("V2")));
        v2.locals.push(VersionPattern::new("*", Language::C));
        tree.register(v2).unwrap();

        assert_eq!(tree.classify("api_open"), Some((0, true)));
        assert_eq!(tree.classify("helper"), Some((1, false)));
    }
}
