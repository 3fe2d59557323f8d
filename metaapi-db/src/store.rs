//! Query template store
//!
//! Loaded once from a YAML mapping of symbolic name -> template. Every
//! template is compiled at load time; any failure aborts the load.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DbError, Result};
use crate::template::{Context, Statement, Template};

/// Immutable mapping of symbolic query names to compiled templates
#[derive(Debug, Clone, Default)]
pub struct QueryStore {
    queries: BTreeMap<String, Template>,
}

impl QueryStore {
    /// Load query definitions from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| DbError::QueryFile {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse(&raw, path)?;
        tracing::debug!(
            path = %path.display(),
            queries = store.len(),
            "query definitions loaded"
        );
        Ok(store)
    }

    /// Parse query definitions from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::parse(yaml, Path::new("<inline>"))
    }

    /// Build a store from name/template pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut queries = BTreeMap::new();
        for (name, source) in pairs {
            let name = name.into();
            let template =
                Template::compile(source.as_ref()).map_err(|source| DbError::QueryTemplate {
                    name: name.clone(),
                    source,
                })?;
            queries.insert(name, template);
        }
        Ok(Self { queries })
    }

    fn parse(yaml: &str, path: &Path) -> Result<Self> {
        let entries: BTreeMap<String, String> =
            serde_yaml::from_str(yaml).map_err(|source| DbError::QueryParse {
                path: PathBuf::from(path),
                source,
            })?;
        Self::from_pairs(entries)
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.queries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Resolve a symbolic name (or, failing that, treat the argument as a
    /// literal template) and render it as a parameterized statement.
    pub fn statement(&self, query: &str, ctx: &Context) -> Result<Statement> {
        match self.resolve(query)? {
            Resolved::Registered(template) => Ok(template.render_statement(query, ctx)?),
            Resolved::Literal(template) => Ok(template.render_statement(query, ctx)?),
        }
    }

    /// Same resolution as [`statement`](Self::statement), rendered as text.
    pub fn render(&self, query: &str, ctx: &Context) -> Result<String> {
        match self.resolve(query)? {
            Resolved::Registered(template) => Ok(template.render_text(ctx)?),
            Resolved::Literal(template) => Ok(template.render_text(ctx)?),
        }
    }

    fn resolve(&self, query: &str) -> Result<Resolved<'_>> {
        if query.trim().is_empty() {
            return Err(DbError::NoQuery);
        }
        match self.queries.get(query) {
            Some(template) => Ok(Resolved::Registered(template)),
            None => Ok(Resolved::Literal(Template::compile(query)?)),
        }
    }
}

enum Resolved<'a> {
    Registered(&'a Template),
    Literal(Template),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn ctx(value: serde_json::Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn registered_name_uses_stored_template() {
        let store = QueryStore::from_pairs([("greet", "Hello {{name}}")]).unwrap();
        let text = store.render("greet", &ctx(json!({"name": "World"}))).unwrap();
        assert_eq!(text, "Hello World");
    }

    #[test]
    fn unknown_name_is_rendered_as_literal() {
        let store = QueryStore::from_pairs([("greet", "Hello {{name}}")]).unwrap();
        assert_eq!(store.render("SELECT 1", &Context::new()).unwrap(), "SELECT 1");

        let stmt = store
            .statement("SELECT * FROM u WHERE id = {{id}}", &ctx(json!({"id": 3})))
            .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM u WHERE id = ?");
        assert_eq!(stmt.signature, "SELECT * FROM u WHERE id = {{id}}");
        // literal lookups never register anything
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn empty_query_is_invalid_usage() {
        let store = QueryStore::default();
        assert!(matches!(
            store.statement("", &Context::new()),
            Err(DbError::NoQuery)
        ));
        assert!(matches!(
            store.render("   ", &Context::new()),
            Err(DbError::NoQuery)
        ));
    }

    #[test]
    fn yaml_mapping_is_loaded() {
        let store = QueryStore::from_yaml_str(
            "getUsers: SELECT * FROM users\ncreateUser: INSERT INTO users (email) VALUES ({{email}})\n",
        )
        .unwrap();
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["createUser", "getUsers"]);
        assert_eq!(store.get("createUser").unwrap().placeholders(), vec!["email"]);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "greet: Hello {{{{name}}}}").unwrap();
        let store = QueryStore::load(file.path()).unwrap();
        assert!(store.contains("greet"));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = QueryStore::load("/nonexistent/metaApi.yml").unwrap_err();
        assert!(matches!(err, DbError::QueryFile { .. }));
    }

    #[test]
    fn malformed_yaml_is_fatal() {
        let err = QueryStore::from_yaml_str("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, DbError::QueryParse { .. }));
    }

    #[test]
    fn malformed_template_is_fatal() {
        let err = QueryStore::from_yaml_str("broken: SELECT {{#a}}x\n").unwrap_err();
        assert!(matches!(err, DbError::QueryTemplate { ref name, .. } if name == "broken"));
    }
}
