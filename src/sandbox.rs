//! The static-files sandbox.
//!
//! Every file we serve must live under one canonical root directory.  The
//! `Sandbox` is created once at startup and handed by reference to the
//! dispatcher; it's immutable afterwards, so sharing it with forked workers
//! needs no coordination.

use std::ffi::OsString;
use std::fs;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::*;

const PATH_MAX: usize = libc::PATH_MAX as usize;

pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Canonicalizes `raw_dir` and adopts it as the root.  The root may not
    /// be `/` (we refuse to serve the whole filesystem) and must name an
    /// existing directory.  Canonicalization also strips any trailing
    /// slashes, which the prefix check below depends on.
    pub fn new(raw_dir: &Path) -> Result<Sandbox> {
        let root = fs::canonicalize(raw_dir).map_err(|_| Error::NotFound)?;
        if root == Path::new("/") {
            return Err(Error::Forbidden);
        }
        if !fs::metadata(&root)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(Sandbox { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a request URI to a real path under the root.
    ///
    /// The URI is appended to the root byte-for-byte and the result is
    /// canonicalized against the live filesystem, resolving `.`, `..` and
    /// symlinks.  Only then is containment checked: the canonical path must
    /// start with the root's bytes.  Checking any earlier would let
    /// `GET /../../etc/passwd` through.
    pub fn resolve(&self, uri: &[u8]) -> Result<PathBuf> {
        let root = self.root.as_os_str().as_bytes();
        if root.len() + uri.len() >= PATH_MAX {
            return Err(Error::NameTooLong);
        }

        let mut joined = Vec::with_capacity(root.len() + uri.len());
        joined.extend_from_slice(root);
        joined.extend_from_slice(uri);
        let joined = PathBuf::from(OsString::from_vec(joined));

        let real = fs::canonicalize(&joined).map_err(|e| {
            debug!("can't resolve {}: {}", joined.display(), e);
            Error::NotFound
        })?;

        if !real.as_os_str().as_bytes().starts_with(root) {
            warn!("uri resolved to a path outside the static files root");
            return Err(Error::Forbidden);
        }
        Ok(real)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("index.html")).unwrap();
        f.write_all(b"<html>hello</html>").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::File::create(dir.path().join("sub/page.html")).unwrap();
        dir
    }

    #[test]
    fn test_new_rejects_missing_dir() {
        match Sandbox::new(Path::new("/this/path/does/not/exist")).err() {
            Some(Error::NotFound) => (),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_filesystem_root() {
        match Sandbox::new(Path::new("/")).err() {
            Some(Error::Forbidden) => (),
            other => panic!("expected Forbidden, got {:?}", other),
        }
        // Dressing the root up in dots changes nothing.
        match Sandbox::new(Path::new("/usr/..")).err() {
            Some(Error::Forbidden) => (),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_new_rejects_plain_file() {
        let dir = fixture();
        match Sandbox::new(&dir.path().join("index.html")).err() {
            Some(Error::NotADirectory) => (),
            other => panic!("expected NotADirectory, got {:?}", other),
        }
    }

    #[test]
    fn test_new_tolerates_trailing_slashes() {
        let dir = fixture();
        let mut raw = dir.path().as_os_str().to_os_string();
        raw.push("////");
        let sandbox = Sandbox::new(Path::new(&raw)).unwrap();
        assert_eq!(sandbox.root(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_resolve_existing_file() {
        let dir = fixture();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let p = sandbox.resolve(b"/index.html").unwrap();
        assert!(p.starts_with(sandbox.root()));
        assert!(p.exists());
        let p = sandbox.resolve(b"/sub/../sub/page.html").unwrap();
        assert!(p.starts_with(sandbox.root()));
    }

    #[test]
    fn test_resolve_missing_file() {
        let dir = fixture();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        match sandbox.resolve(b"/bogus/path").err() {
            Some(Error::NotFound) => (),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_escape_is_forbidden() {
        let dir = fixture();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        // The parent of a temp dir always exists, so this resolves fine and
        // must be caught by the containment check.
        match sandbox.resolve(b"/..").err() {
            Some(Error::Forbidden) => (),
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_oversized_uri() {
        let dir = fixture();
        let sandbox = Sandbox::new(dir.path()).unwrap();
        let big = vec![b'a'; PATH_MAX];
        match sandbox.resolve(&big).err() {
            Some(Error::NameTooLong) => (),
            other => panic!("expected NameTooLong, got {:?}", other),
        }
    }
}
