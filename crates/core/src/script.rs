use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use crate::CoreError;

/// Source of named SQL scripts (`create_<version>`, `migrate_<from>_<to>`).
pub trait ScriptProvider: Send + Sync {
    /// Returns the script text, or `Ok(None)` when no script has that name.
    fn script(&self, name: &str) -> Result<Option<String>, CoreError>;
}

/// Scripts held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryScripts {
    scripts: HashMap<String, String>,
}

impl MemoryScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.scripts.insert(name.into(), text.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.scripts.remove(name)
    }
}

impl ScriptProvider for MemoryScripts {
    fn script(&self, name: &str) -> Result<Option<String>, CoreError> {
        Ok(self.scripts.get(name).cloned())
    }
}

/// Scripts read from `<dir>/<name>.sql` on every lookup.
#[derive(Debug, Clone)]
pub struct DirScripts {
    dir: PathBuf,
}

impl DirScripts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ScriptProvider for DirScripts {
    fn script(&self, name: &str) -> Result<Option<String>, CoreError> {
        let path = self.dir.join(format!("{name}.sql"));
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

/// A loaded script, split into statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub name: String,
    pub statements: Vec<String>,
}

impl Script {
    pub fn load(provider: &dyn ScriptProvider, name: &str) -> Result<Self, CoreError> {
        let text = provider
            .script(name)?
            .ok_or_else(|| CoreError::ScriptMissing(name.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            statements: split(&text),
        })
    }

    /// Statements with content, in order. Blank segments are no-ops.
    pub fn executable(&self) -> impl Iterator<Item = &str> {
        self.statements
            .iter()
            .map(String::as_str)
            .filter(|s| !is_blank(s))
    }
}

/// Splits script text on `;`.
///
/// Every segment is kept, including an empty trailing one after the final
/// `;`. A `;` inside a quoted literal or a `--` comment does not split.
pub fn split(raw: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if in_comment {
            if c == '\n' {
                in_comment = false;
            }
            continue;
        }
        match quote {
            // A doubled quote inside a literal is an escaped quote: the
            // second one reopens the literal on the next iteration.
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '-' if chars.peek() == Some(&'-') => in_comment = true,
                ';' => {
                    current.pop();
                    statements.push(std::mem::take(&mut current));
                }
                _ => {}
            },
        }
    }
    statements.push(current);
    statements
}

/// True when a statement holds only whitespace and `--` comments.
pub fn is_blank(statement: &str) -> bool {
    statement
        .lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}
