// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Working-directory staging: the replicated utilities, public and archive
//! directories are created on first run, and the utilities pushed to every
//! host are refreshed from `PATH` when they are newer.

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Ensure a directory exists with mode 0750. Returns true when it was
/// created.
pub fn create_dir(dir: &Path) -> Result<bool> {
    if dir.exists() {
        return Ok(false);
    }
    println!("bstage: initialized directory '{}'", dir.display());
    std::fs::create_dir_all(dir).with_context(|| format!("mkdir {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o750))
            .with_context(|| format!("chmod {}", dir.display()))?;
    }
    Ok(true)
}

/// Copy `src` over `dst` when `dst` is missing or older than `src`.
pub fn install_if_new(src: &Path, dst: &Path) -> Result<()> {
    let src_meta =
        std::fs::metadata(src).with_context(|| format!("unable to stat '{}'", src.display()))?;

    if let Some(parent) = dst.parent() {
        create_dir(parent)?;
    }

    let up_to_date = match std::fs::metadata(dst) {
        Ok(dst_meta) => match (src_meta.modified(), dst_meta.modified()) {
            (Ok(src_time), Ok(dst_time)) => src_time <= dst_time,
            _ => false,
        },
        Err(_) => false,
    };
    if up_to_date {
        return Ok(());
    }

    println!("bstage: updating '{}'", dst.display());
    std::fs::copy(src, dst)
        .with_context(|| format!("copy failed {} -> {}", src.display(), dst.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dst, std::fs::Permissions::from_mode(0o755))
            .with_context(|| format!("chmod {}", dst.display()))?;
    }
    Ok(())
}

/// The public directory is exposed to every connected host; refusing a
/// world-writable one keeps an untrusted local user from planting sources.
pub fn check_public_dir(dir: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let meta = std::fs::metadata(dir)
            .with_context(|| format!("unable to stat '{}'", dir.display()))?;
        if meta.permissions().mode() & 0o002 != 0 {
            bail!(
                "public directory '{}' is world-writable, tighten its mode",
                dir.display()
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_create_dir_sets_mode() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("_rutils");
        assert!(create_dir(&dir).unwrap());
        assert!(!create_dir(&dir).unwrap());
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_install_if_new_copies_and_skips() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("rinstall");
        let dst = tmp.path().join("_rutils/rinstall");
        std::fs::write(&src, b"#!/bin/sh\n").unwrap();

        install_if_new(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"#!/bin/sh\n");

        // an already current copy is left alone
        let before = std::fs::metadata(&dst).unwrap().modified().unwrap();
        install_if_new(&src, &dst).unwrap();
        let after = std::fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_install_if_new_missing_source() {
        let tmp = TempDir::new().unwrap();
        let err = install_if_new(&tmp.path().join("absent"), &tmp.path().join("dst"));
        assert!(err.is_err());
    }

    #[test]
    fn test_check_public_dir_rejects_world_writable() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("_sources");
        std::fs::create_dir(&dir).unwrap();
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o757)).unwrap();
        assert!(check_public_dir(&dir).is_err());

        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o750)).unwrap();
        assert!(check_public_dir(&dir).is_ok());
    }
}
