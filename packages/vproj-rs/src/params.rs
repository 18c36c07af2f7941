//! Parameter files.
//!
//! Plain text, one `key value ...` per line. Everything after `#` is ignored,
//! values that parse as numbers become numbers, and `%include other` pulls in
//! another file (relative to the including one). Later keys override earlier
//! ones. A key with exactly one value holds that value rather than a list.
//!
//! ```text
//! # alpha run
//! %include common
//! band 8 13
//! time -0.5 1.5
//! marks stim resp
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, VprojError};
use crate::types::{Band, TimeWindow};

pub const PARAM_SUFFIX: &str = ".param";
const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    fn coerce(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(token.to_string()),
        }
    }

    fn items(&self) -> &[ParamValue] {
        match self {
            ParamValue::List(items) => items,
            scalar => std::slice::from_ref(scalar),
        }
    }

    fn text(&self) -> String {
        match self {
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::List(items) => items
                .iter()
                .map(ParamValue::text)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamFile {
    values: BTreeMap<String, ParamValue>,
}

impl ParamFile {
    /// Load `path`, or `path.param` if `path` cannot be read.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = load_raw(path, 0)?;
        let values = raw
            .into_iter()
            .map(|(key, mut items)| {
                let value = if items.len() == 1 {
                    items.remove(0)
                } else {
                    ParamValue::List(items)
                };
                (key, value)
            })
            .collect();
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// All values of `key` as numbers.
    pub fn numbers(&self, key: &str) -> Result<Option<Vec<f64>>> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        value
            .items()
            .iter()
            .map(|item| match item {
                ParamValue::Number(n) => Ok(*n),
                other => Err(VprojError::InvalidParameter(format!(
                    "Parameter '{}': '{}' is not a number",
                    key,
                    other.text()
                ))),
            })
            .collect::<Result<Vec<f64>>>()
            .map(Some)
    }

    /// The single numeric value of `key`.
    pub fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.numbers(key)? {
            None => Ok(None),
            Some(values) if values.len() == 1 => Ok(Some(values[0])),
            Some(values) => Err(VprojError::InvalidParameter(format!(
                "Parameter '{}' takes one value, got {}",
                key,
                values.len()
            ))),
        }
    }

    /// Values of `key` as words, numbers rendered back to text.
    pub fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.get(key)
            .map(|value| value.items().iter().map(ParamValue::text).collect())
    }

    pub fn band(&self) -> Result<Option<Band>> {
        Ok(self
            .pair("band")?
            .map(|(lo, hi)| Band::new(lo, hi)))
    }

    pub fn time(&self) -> Result<Option<TimeWindow>> {
        Ok(self
            .pair("time")?
            .map(|(t0, t1)| TimeWindow::new(t0, t1)))
    }

    fn pair(&self, key: &str) -> Result<Option<(f64, f64)>> {
        match self.numbers(key)? {
            None => Ok(None),
            Some(values) if values.len() == 2 => Ok(Some((values[0], values[1]))),
            Some(values) => Err(VprojError::InvalidParameter(format!(
                "Parameter '{}' takes two numbers, got {}",
                key,
                values.len()
            ))),
        }
    }
}

fn load_raw(path: &Path, depth: usize) -> Result<BTreeMap<String, Vec<ParamValue>>> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(VprojError::InvalidParameter(format!(
            "Parameter includes nested too deeply at {}",
            path.display()
        )));
    }

    let (path, content) = match std::fs::read_to_string(path) {
        Ok(content) => (path.to_path_buf(), content),
        Err(first) => {
            let mut alt = path.as_os_str().to_owned();
            alt.push(PARAM_SUFFIX);
            let alt = PathBuf::from(alt);
            match std::fs::read_to_string(&alt) {
                Ok(content) => (alt, content),
                Err(_) => return Err(VprojError::Io(first)),
            }
        }
    };
    log::debug!("Reading parameters from {}", path.display());
    let dir = path.parent().unwrap_or_else(|| Path::new(""));

    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };

        if key == "%include" {
            let target = tokens.next().ok_or_else(|| {
                VprojError::InvalidParameter(format!("%include without a file in {}", path.display()))
            })?;
            let target = Path::new(target);
            let target = if target.is_absolute() {
                target.to_path_buf()
            } else {
                dir.join(target)
            };
            values.extend(load_raw(&target, depth + 1)?);
        } else {
            values.insert(key.to_string(), tokens.map(ParamValue::coerce).collect());
        }
    }
    Ok(values)
}
