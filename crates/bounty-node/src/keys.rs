use anyhow::{bail, Context, Result};
use bounty_ledger::EscrowAuthority;
use std::fs;
use std::path::Path;
use tracing::info;

/// Load the escrow authority from a hex key file, creating one on first run.
pub fn load_or_create(path: &Path) -> Result<EscrowAuthority> {
    if path.exists() {
        let authority = load(path)?;
        info!(escrow = %authority.address(), path = ?path, "🔐 Loaded escrow authority");
        Ok(authority)
    } else {
        let authority = EscrowAuthority::generate();
        save(path, &authority)?;
        info!(escrow = %authority.address(), path = ?path, "✨ Created escrow authority");
        Ok(authority)
    }
}

pub fn load(path: &Path) -> Result<EscrowAuthority> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read key file {:?}", path))?;
    let bytes = hex::decode(content.trim()).context("Key file is not valid hex")?;
    let Ok(secret) = <[u8; 32]>::try_from(bytes.as_slice()) else {
        bail!("Key file must hold 32 bytes, found {}", bytes.len());
    };
    Ok(EscrowAuthority::from_secret_bytes(&secret))
}

/// Write the secret key, readable by the owner only.
pub fn save(path: &Path, authority: &EscrowAuthority) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, hex::encode(authority.secret_bytes()))
        .with_context(|| format!("Failed to write key file {:?}", path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_persists_across_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("escrow.key");

        let created = load_or_create(&path).unwrap();
        let loaded = load_or_create(&path).unwrap();
        assert_eq!(created.address(), loaded.address());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_rejects_malformed_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("escrow.key");

        fs::write(&path, "not hex").unwrap();
        assert!(load(&path).is_err());

        fs::write(&path, "abcd").unwrap();
        assert!(load(&path).is_err());
    }
}
