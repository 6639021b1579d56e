//! Dataset resource lookup
//!
//! Resources are addressed by relative paths such as `json/dataSet.json`,
//! optionally prefixed with `classpath:`. [`ClasspathResources`] resolves them
//! against an ordered list of root directories, the first root holding the
//! path wins.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Prefix accepted (and ignored) in front of resource locations
pub const CLASSPATH_PREFIX: &str = "classpath:";

/// Source of dataset files
pub trait ResourceProvider: Send + Sync {
    fn exists(&self, location: &str) -> bool;

    fn read_to_string(&self, location: &str) -> Result<String>;
}

/// Directory-backed resource provider
#[derive(Debug, Clone, Default)]
pub struct ClasspathResources {
    roots: Vec<PathBuf>,
}

impl ClasspathResources {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Path of a location under the first root that has it
    pub fn resolve(&self, location: &str) -> Option<PathBuf> {
        let relative = normalize_location(location);
        if relative.is_empty() {
            return None;
        }
        self.roots
            .iter()
            .map(|root| root.join(relative))
            .find(|candidate| candidate.is_file())
    }
}

impl ResourceProvider for ClasspathResources {
    fn exists(&self, location: &str) -> bool {
        self.resolve(location).is_some()
    }

    fn read_to_string(&self, location: &str) -> Result<String> {
        let path = self.resolve(location).ok_or_else(|| {
            Error::resource_not_found(format!(
                "{} (searched {})",
                location,
                display_roots(&self.roots)
            ))
        })?;
        Ok(std::fs::read_to_string(path)?)
    }
}

/// Strip the `classpath:` prefix and leading slashes
pub fn normalize_location(location: &str) -> &str {
    location
        .trim()
        .strip_prefix(CLASSPATH_PREFIX)
        .unwrap_or(location.trim())
        .trim_start_matches('/')
}

fn display_roots(roots: &[PathBuf]) -> String {
    let shown: Vec<String> = roots.iter().map(|r| r.display().to_string()).collect();
    if shown.is_empty() {
        "no roots".to_string()
    } else {
        shown.join(", ")
    }
}

/// Identity of a test type, used to derive conventional dataset names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestClass {
    path: String,
}

impl TestClass {
    /// Identity of a Rust type, from its `type_name`
    pub fn of<T: ?Sized>() -> Self {
        Self::named(std::any::type_name::<T>())
    }

    /// Identity from an explicit path, `::` or `.` separated
    pub fn named(path: impl Into<String>) -> Self {
        let path: String = path.into();
        // generic arguments do not belong in a resource name
        let path = path.split('<').next().unwrap_or_default().to_string();
        Self { path }
    }

    pub fn name(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn simple_name(&self) -> &str {
        self.segments().last().unwrap_or_default()
    }

    /// Full path as a resource path: `a::b::Test` -> `a/b/Test`
    pub fn resource_path(&self) -> String {
        self.segments().collect::<Vec<_>>().join("/")
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.path
            .split("::")
            .flat_map(|segment| segment.split('.'))
            .filter(|segment| !segment.is_empty())
    }

    /// Conventional dataset location, package-qualified or by simple name
    pub fn dataset_location(&self, qualified: bool, extension: &str) -> String {
        let base = if qualified {
            self.resource_path()
        } else {
            self.simple_name().to_string()
        };
        format!("{}-dataset.{}", base, extension)
    }
}

/// Find the conventional dataset of a test type.
///
/// Tries `<full/path/of/Test>-dataset.<ext>` then `<Test>-dataset.<ext>`;
/// `None` when neither exists.
pub fn locate(resources: &dyn ResourceProvider, test_class: &TestClass, extension: &str) -> Option<String> {
    let qualified = test_class.dataset_location(true, extension);
    if resources.exists(&qualified) {
        log::debug!("Found dataset {} for {}", qualified, test_class.name());
        return Some(qualified);
    }
    let simple = test_class.dataset_location(false, extension);
    if resources.exists(&simple) {
        log::debug!("Found dataset {} for {}", simple, test_class.name());
        return Some(simple);
    }
    log::debug!(
        "No {} dataset at {} or {}",
        extension,
        qualified,
        simple
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    struct MyDataSetTest;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_class_names() {
        let class = TestClass::named("org.cassandraunit.spring.MyTest");
        assert_eq!(class.simple_name(), "MyTest");
        assert_eq!(class.resource_path(), "org/cassandraunit/spring/MyTest");

        let class = TestClass::of::<MyDataSetTest>();
        assert_eq!(class.simple_name(), "MyDataSetTest");
        assert!(class.resource_path().ends_with("resource/tests/MyDataSetTest"));

        let class = TestClass::named("a::b::Wrapper<u8>");
        assert_eq!(class.simple_name(), "Wrapper");
    }

    #[test]
    fn test_locate_prefers_qualified_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b/MyTest-dataset.cql", "qualified");
        write(dir.path(), "MyTest-dataset.cql", "simple");
        let resources = ClasspathResources::new([dir.path()]);

        let class = TestClass::named("a::b::MyTest");
        assert_eq!(
            locate(&resources, &class, "cql").as_deref(),
            Some("a/b/MyTest-dataset.cql")
        );
    }

    #[test]
    fn test_locate_falls_back_to_simple_name() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "MyTest-dataset.cql", "simple");
        let resources = ClasspathResources::new([dir.path()]);

        let class = TestClass::named("a::b::MyTest");
        assert_eq!(locate(&resources, &class, "cql").as_deref(), Some("MyTest-dataset.cql"));
        assert_eq!(locate(&resources, &class, "json"), None);
    }

    #[test]
    fn test_locate_none_when_missing() {
        let dir = TempDir::new().unwrap();
        let resources = ClasspathResources::new([dir.path()]);
        assert_eq!(locate(&resources, &TestClass::named("x.Y"), "cql"), None);
    }

    #[test]
    fn test_roots_are_searched_in_order() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write(first.path(), "cql/simple.cql", "first");
        write(second.path(), "cql/simple.cql", "second");
        write(second.path(), "cql/other.cql", "other");
        let resources = ClasspathResources::new([first.path(), second.path()]);

        assert_eq!(resources.read_to_string("classpath:/cql/simple.cql").unwrap(), "first");
        assert_eq!(resources.read_to_string("cql/other.cql").unwrap(), "other");
        assert!(matches!(
            resources.read_to_string("cql/missing.cql"),
            Err(Error::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_normalize_location() {
        assert_eq!(normalize_location("classpath:/json/a.json"), "json/a.json");
        assert_eq!(normalize_location("/json/a.json"), "json/a.json");
        assert_eq!(normalize_location("json/a.json"), "json/a.json");
    }
}
