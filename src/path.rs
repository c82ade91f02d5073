// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine default locations for the files ocrevert reads and writes, i.e.,
//! the baseline store and the optional settings file.

use std::path::PathBuf;

/// Determine default absolute path to baseline store directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/ocrevert/baseline` as the
/// default absolute path for the baseline store. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_baseline_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("ocrevert").join("baseline"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to settings file.
///
/// Uses `$XDG_CONFIG_HOME/ocrevert/config.toml`. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_config_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("ocrevert").join("config.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::data_dir`](https://docs.rs/dirs/latest/dirs/fn.data_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_DATA_HOME", "/home/blah/.data")])]
    fn default_baseline_dir_follows_xdg() -> anyhow::Result<()> {
        let result = default_baseline_dir()?;
        let expect = PathBuf::from("/home/blah/.data/ocrevert/baseline");
        assert_eq!(result, expect);

        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[sealed_test(env = [("HOME", "/home/blah"), ("XDG_CONFIG_HOME", "/home/blah/.conf")])]
    fn default_config_file_follows_xdg() -> anyhow::Result<()> {
        let result = default_config_file()?;
        let expect = PathBuf::from("/home/blah/.conf/ocrevert/config.toml");
        assert_eq!(result, expect);

        Ok(())
    }
}
