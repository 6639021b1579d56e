//! CQL script datasets

use crate::error::Result;
use crate::resource::ResourceProvider;

/// Replication used when a CQL dataset creates its keyspace
pub const DEFAULT_KEYSPACE_REPLICATION: &str =
    "{'class': 'SimpleStrategy', 'replication_factor': 1}";

/// A CQL script plus what to do with its target keyspace first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqlDataSet {
    statements: Vec<String>,
    keyspace: Option<String>,
    create_keyspace: bool,
    drop_keyspace: bool,
}

impl CqlDataSet {
    /// Dataset from script text, used as-is without a target keyspace
    pub fn from_script(script: &str) -> Self {
        Self {
            statements: split_statements(script),
            keyspace: None,
            create_keyspace: false,
            drop_keyspace: false,
        }
    }

    /// Read a script from a resource location
    pub fn from_resource(resources: &dyn ResourceProvider, location: &str) -> Result<Self> {
        let script = resources.read_to_string(location)?;
        Ok(Self::from_script(&script))
    }

    /// Run the script inside `keyspace`, optionally dropping and creating it first
    pub fn in_keyspace(mut self, keyspace: impl Into<String>, recreate: bool) -> Self {
        self.keyspace = Some(keyspace.into());
        self.create_keyspace = recreate;
        self.drop_keyspace = recreate;
        self
    }

    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    pub fn is_keyspace_creation(&self) -> bool {
        self.create_keyspace
    }

    pub fn is_keyspace_deletion(&self) -> bool {
        self.drop_keyspace
    }

    /// Statements of the script alone
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Everything to execute, keyspace handling included, in order
    pub fn execution_plan(&self) -> Vec<String> {
        let mut plan = Vec::with_capacity(self.statements.len() + 3);
        if let Some(keyspace) = &self.keyspace {
            if self.drop_keyspace {
                plan.push(format!("DROP KEYSPACE IF EXISTS {}", keyspace));
            }
            if self.create_keyspace {
                plan.push(format!(
                    "CREATE KEYSPACE {} WITH replication = {}",
                    keyspace, DEFAULT_KEYSPACE_REPLICATION
                ));
            }
            plan.push(format!("USE {}", keyspace));
        }
        plan.extend(self.statements.iter().cloned());
        plan
    }
}

/// Split a CQL script into statements.
///
/// Statements end with `;` outside of quoted strings, quoted identifiers,
/// `$$` blocks and comments. Comments are dropped, a trailing statement
/// without `;` is kept, empty statements are skipped.
pub fn split_statements(script: &str) -> Vec<String> {
    #[derive(PartialEq)]
    enum State {
        Code,
        SingleQuoted,
        DoubleQuoted,
        Dollar,
        LineComment,
        BlockComment,
    }

    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Code;
    let mut chars = script.chars().peekable();

    let mut finish = |current: &mut String| {
        let statement = current.trim();
        if !statement.is_empty() {
            statements.push(statement.to_string());
        }
        current.clear();
    };

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                ';' => finish(&mut current),
                '\'' => {
                    state = State::SingleQuoted;
                    current.push(c);
                }
                '"' => {
                    state = State::DoubleQuoted;
                    current.push(c);
                }
                '$' if chars.peek() == Some(&'$') => {
                    chars.next();
                    state = State::Dollar;
                    current.push_str("$$");
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                _ => current.push(c),
            },
            State::SingleQuoted => {
                current.push(c);
                if c == '\'' {
                    // '' is an escaped quote
                    if chars.peek() == Some(&'\'') {
                        current.push('\'');
                        chars.next();
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::DoubleQuoted => {
                current.push(c);
                if c == '"' {
                    state = State::Code;
                }
            }
            State::Dollar => {
                current.push(c);
                if c == '$' && chars.peek() == Some(&'$') {
                    current.push('$');
                    chars.next();
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    current.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push(' ');
                    state = State::Code;
                }
            }
        }
    }
    finish(&mut current);
    statements
}
