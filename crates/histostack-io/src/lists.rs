//! Basename lists and per-basename files.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

/// Basenames from a list file, one per line; blank lines are skipped.
pub fn read_basenames<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read basename list {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// `dir/<basename><extension>` for each basename.
pub fn construct_paths<P: AsRef<Path>>(dir: P, basenames: &[String], extension: &str) -> Vec<PathBuf> {
    basenames
        .iter()
        .map(|basename| dir.as_ref().join(format!("{}{}", basename, extension)))
        .collect()
}

/// Sorted names of the regular files in `dir`.
pub fn directory_contents<P: AsRef<Path>>(dir: P) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("Failed to list directory {}", dir.display()))?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Write each value to `dir/<basename>`, creating `dir` if needed.
pub fn save_vector_to_files<T: Display, P: AsRef<Path>>(values: &[T], dir: P, basenames: &[String]) -> Result<()> {
    let dir = dir.as_ref();
    anyhow::ensure!(
        values.len() == basenames.len(),
        "{} values for {} basenames",
        values.len(),
        basenames.len()
    );
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (value, basename) in values.iter().zip(basenames) {
        let path = dir.join(basename);
        fs::write(&path, format!("{}\n", value)).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Read back the values written by [`save_vector_to_files`].
pub fn load_vector_from_files<T, P>(dir: P, basenames: &[String]) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    P: AsRef<Path>,
{
    basenames
        .iter()
        .map(|basename| {
            let path = dir.as_ref().join(basename);
            let text = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            text.trim()
                .parse()
                .with_context(|| format!("Bad value in {}", path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_basenames_skips_blanks() -> Result<()> {
        let dir = tempdir()?;
        let list = dir.path().join("image_list.txt");
        fs::write(&list, "0001\n\n0002\r\n  \n0003")?;
        assert_eq!(read_basenames(&list)?, vec!["0001", "0002", "0003"]);
        Ok(())
    }

    #[test]
    fn test_construct_paths() {
        let paths = construct_paths("/data/LoRes", &["0001".to_string(), "0002".to_string()], ".bmp");
        assert_eq!(paths, vec![PathBuf::from("/data/LoRes/0001.bmp"), PathBuf::from("/data/LoRes/0002.bmp")]);
    }

    #[test]
    fn test_directory_contents_sorted_files_only() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("0002_0003"), "")?;
        fs::write(dir.path().join("0001_0002"), "")?;
        fs::create_dir(dir.path().join("nested"))?;
        assert_eq!(directory_contents(dir.path())?, vec!["0001_0002", "0002_0003"]);
        Ok(())
    }

    #[test]
    fn test_vector_files_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("number_of_times_too_big");
        let basenames = vec!["0001".to_string(), "0002".to_string()];
        save_vector_to_files(&[0u32, 3], &out, &basenames)?;
        assert_eq!(fs::read_to_string(out.join("0002"))?, "3\n");
        assert_eq!(load_vector_from_files::<u32, _>(&out, &basenames)?, vec![0, 3]);
        Ok(())
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(save_vector_to_files(&[1, 2], dir.path(), &["0001".to_string()]).is_err());
    }
}
