//! Reader and writer for the `key = value` parameters file.
//!
//! Entries are grouped in `&group ... /` namelists. Keys inside a `&species`
//! group are flattened with the species' 1-based position appended
//! (`name1`, `temp2`, ...), so per-species values are addressed the same way
//! as global ones.

use crate::error::AnalysisError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    key: String,
    flat: String,
    value: String,
}

/// One `&name ... /` namelist; species groups carry their 1-based position.
#[derive(Debug, Clone, PartialEq)]
struct Group {
    name: String,
    species: Option<usize>,
    entries: Vec<Entry>,
}

/// Parsed parameters file. Group layout and entry order survive a
/// parse/write cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterFile {
    loose: Vec<Entry>,
    groups: Vec<Group>,
}

impl ParameterFile {
    pub fn parse(reader: impl BufRead) -> Result<Self> {
        let mut file = Self::default();
        let mut open: Option<Group> = None;
        let mut species_count = 0usize;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Reading parameters line {}", lineno + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') {
                continue;
            }
            if let Some(name) = trimmed.strip_prefix('&') {
                let name = name.trim().to_string();
                let species = if name.eq_ignore_ascii_case("species") {
                    species_count += 1;
                    Some(species_count)
                } else {
                    None
                };
                if let Some(group) = open.replace(Group {
                    name,
                    species,
                    entries: Vec::new(),
                }) {
                    file.groups.push(group);
                }
                continue;
            }
            if trimmed == "/" {
                if let Some(group) = open.take() {
                    file.groups.push(group);
                }
                continue;
            }
            let Some((key, value)) = trimmed.split_once('=') else {
                bail!(AnalysisError::Parse {
                    line: lineno + 1,
                    message: format!("expected `key = value`, found \"{trimmed}\""),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                bail!(AnalysisError::Parse {
                    line: lineno + 1,
                    message: "empty key".to_string(),
                });
            }
            let value = value.trim().to_string();
            match open.as_mut() {
                Some(group) => {
                    let flat = flat_key(key, group.species);
                    upsert(&mut group.entries, key, flat, value);
                }
                None => upsert(&mut file.loose, key, key.to_string(), value),
            }
        }
        if let Some(group) = open {
            file.groups.push(group);
        }

        Ok(file)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open parameters file {}", path.display()))?;
        Self::parse(BufReader::new(file))
            .with_context(|| format!("Failed to parse parameters file {}", path.display()))
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.loose
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.entries.iter()))
    }

    /// Looks up a key; species keys carry their position (`name1`, `temp2`).
    /// String values come back without their quotes.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries()
            .find(|e| e.flat == key)
            .map(|e| strip_quotes(&e.value))
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| AnalysisError::UnknownKey(key.to_string()).into())
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        let raw = self.require(key)?;
        parse_fortran_f64(raw).with_context(|| format!("Parameter {key} = \"{raw}\" is not a number"))
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let raw = self.require(key)?;
        raw.parse::<usize>()
            .with_context(|| format!("Parameter {key} = \"{raw}\" is not a non-negative integer"))
    }

    /// Overwrites `key`, appending it outside any group when absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        for group in self.groups.iter_mut() {
            if let Some(entry) = group.entries.iter_mut().find(|e| e.flat == key) {
                entry.value = value;
                return;
            }
        }
        upsert(&mut self.loose, key, key.to_string(), value);
    }

    /// Sets `key` inside the `species`-th (1-based) species group.
    pub fn set_species(&mut self, species: usize, key: &str, value: impl Into<String>) -> Result<()> {
        let Some(group) = self.groups.iter_mut().find(|g| g.species == Some(species)) else {
            bail!(AnalysisError::UnknownKey(format!("species group {species}")));
        };
        let flat = flat_key(key, group.species);
        upsert(&mut group.entries, key, flat, value.into());
        Ok(())
    }

    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        for entry in &self.loose {
            writeln!(writer, "{} = {}", entry.key, entry.value)?;
        }
        for group in &self.groups {
            writeln!(writer, "&{}", group.name)?;
            for entry in &group.entries {
                writeln!(writer, "{} = {}", entry.key, entry.value)?;
            }
            writeln!(writer, "/")?;
            writeln!(writer)?;
        }
        Ok(())
    }
}

fn flat_key(key: &str, species: Option<usize>) -> String {
    match species {
        Some(n) => format!("{key}{n}"),
        None => key.to_string(),
    }
}

fn upsert(entries: &mut Vec<Entry>, key: &str, flat: String, value: String) {
    match entries.iter_mut().find(|e| e.flat == flat) {
        Some(entry) => entry.value = value,
        None => entries.push(Entry {
            key: key.to_string(),
            flat,
            value,
        }),
    }
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
            || (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"'))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Accepts Fortran `d` exponents (`1.0d-3`).
fn parse_fortran_f64(raw: &str) -> Result<f64> {
    let normalized = raw.replace(['d', 'D'], "e");
    Ok(normalized.parse::<f64>()?)
}

/// Word size of the binary field files. Carried for [`crate::io::field::FieldSource`]
/// implementations that decode those files; the analysis itself never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    Single,
    Double,
}

/// Rotational-transform data present for global runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalMode {
    pub n0_global: f64,
    pub q0: f64,
}

/// The subset of simulation parameters the analysis needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimParameters {
    pub kymin: f64,
    pub nexc: usize,
    pub nx: usize,
    pub nz: usize,
    pub species: Vec<String>,
    /// `PRECISION` of the run, for external field loaders.
    pub precision: Precision,
    pub lx: f64,
    pub temp1: f64,
    pub dens1: f64,
    pub global: Option<GlobalMode>,
}

impl SimParameters {
    pub fn from_file(pars: &ParameterFile) -> Result<Self> {
        let n_spec = pars.get_usize("n_spec")?;
        let species = (1..=n_spec)
            .map(|i| pars.require(&format!("name{i}")).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        let precision = match pars.get("PRECISION") {
            Some(p) if p.eq_ignore_ascii_case("single") => Precision::Single,
            _ => Precision::Double,
        };
        let global = match (pars.get("n0_global"), pars.get("q0")) {
            (Some(_), Some(_)) => Some(GlobalMode {
                n0_global: pars.get_f64("n0_global")?,
                q0: pars.get_f64("q0")?,
            }),
            _ => None,
        };
        let params = Self {
            kymin: pars.get_f64("kymin")?,
            nexc: pars.get_usize("nexc")?,
            nx: pars.get_usize("nx0")?,
            nz: pars.get_usize("nz0")?,
            species,
            precision,
            lx: pars.get_f64("lx")?,
            temp1: optional_f64(pars, "temp1", 1.0)?,
            dens1: optional_f64(pars, "dens1", 1.0)?,
            global,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nx == 0 || self.nz == 0 {
            bail!("Grid sizes must be positive (nx0 = {}, nz0 = {}).", self.nx, self.nz);
        }
        if self.species.is_empty() {
            bail!("At least one species is required.");
        }
        if !(self.kymin.is_finite() && self.kymin > 0.0) {
            bail!("kymin must be positive, got {}.", self.kymin);
        }
        Ok(())
    }

    pub fn n_spec(&self) -> usize {
        self.species.len()
    }
}

fn optional_f64(pars: &ParameterFile, key: &str, default: f64) -> Result<f64> {
    match pars.get(key) {
        Some(_) => pars.get_f64(key),
        None => Ok(default),
    }
}
