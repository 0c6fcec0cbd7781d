// Shared test helpers for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, tempdir};

use sub_test::core::config::Environment;

/// A fake compiler: `.chpl` sources are shell scripts that become the
/// executable. `#compile-error <msg>` lines make it fail with `<msg>`,
/// `#compile-hang` makes it sleep, and `--warn` prints a warning.
pub const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    --warn) echo "warning: requested by compopts"; shift ;;
    *.chpl) src="$1"; shift ;;
    *) shift ;;
  esac
done
if grep -q '^#compile-error' "$src"; then
  sed -n 's/^#compile-error //p' "$src"
  exit 1
fi
if grep -q '^#compile-hang' "$src"; then
  sleep 30
fi
{ echo '#!/bin/sh'; cat "$src"; } > "$out"
chmod +x "$out"
"#;

/// `testEnv ./file`: the predicate file itself holds the answer.
pub const FAKE_TEST_ENV: &str = "#!/bin/sh\ncat \"$1\"\n";

/// A fake installation: `<root>/home` is `CHPL_HOME`, `<root>/home/test` the
/// test root and `<root>/util` the helper directory.
pub struct Fixture {
    pub root: TempDir,
    pub vars: HashMap<String, String>,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempdir().expect("Failed to create temporary directory");
        let home = root.path().join("home");
        fs::create_dir_all(home.join("test")).unwrap();
        fs::create_dir_all(home.join("bin")).unwrap();
        fs::create_dir_all(root.path().join("util").join("test")).unwrap();

        write_script(&home.join("bin").join("chpl"), FAKE_COMPILER);
        write_script(&root.path().join("util").join("test").join("testEnv"), FAKE_TEST_ENV);

        let mut vars = HashMap::new();
        vars.insert("CHPL_HOME".to_string(), home.display().to_string());
        vars.insert(
            "CHPL_TEST_UTIL_DIR".to_string(),
            root.path().join("util").display().to_string(),
        );
        vars.insert("CHPL_TEST_MACHINE".to_string(), "testhost".to_string());
        vars.insert("CHPL_TARGET_PLATFORM".to_string(), "linux64".to_string());
        vars.insert("CHPL_COMM".to_string(), "none".to_string());

        Self { root, vars }
    }

    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    pub fn compiler(&self) -> PathBuf {
        self.home().join("bin").join("chpl")
    }

    pub fn util_test_dir(&self) -> PathBuf {
        self.root.path().join("util").join("test")
    }

    /// Creates (if needed) and returns `<test root>/<label>`.
    pub fn test_dir(&self, label: &str) -> PathBuf {
        let dir = self.home().join("test").join(label);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub async fn environment(&self) -> Environment {
        let vars = self.vars.clone();
        Environment::from_lookup(&self.compiler(), move |key| vars.get(key).cloned())
            .await
            .expect("fixture environment should be valid")
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn write_script(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

/// Lines of `log` that look like `[...]` tags.
pub fn tags(log: &str) -> Vec<&str> {
    log.lines().filter(|line| line.contains('[')).collect()
}
