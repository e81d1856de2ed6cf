// INI-style machine configuration: `[printer]`, `[stepper_x]`, `[extruder]`,
// `[probe <name>]` sections with typed, bounds-checked accessors.
//
// Options irrelevant to this core (step/dir/enable pins, microsteps,
// rotation_distance) may appear in the file; they are stored but never
// interpreted here.

use crate::error::ConfigError;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct Configfile {
    // section name (lowercase) -> option name (lowercase) -> raw value
    data: HashMap<String, HashMap<String, String>>,
}

impl Configfile {
    pub fn new() -> Self {
        Configfile {
            data: HashMap::new(),
        }
    }

    /// Parse an INI-style configuration string. Both `key: value` and
    /// `key = value` separators are accepted; `#` and `;` start comments.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut cfg = Configfile::new();
        let mut current: Option<String> = None;

        for raw in content.lines() {
            let line = match raw.find(|c| c == '#' || c == ';') {
                Some(idx) => &raw[..idx],
                None => raw,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = line[1..line.len() - 1].trim().to_lowercase();
                if name.is_empty() {
                    return Err(ConfigError::SectionNotFound("<empty>".to_string()));
                }
                cfg.data.entry(name.clone()).or_default();
                current = Some(name);
            } else if let Some(section) = &current {
                let (key, value) = match line.split_once(|c| c == ':' || c == '=') {
                    Some((k, v)) => (k.trim().to_lowercase(), v.trim().to_string()),
                    None => {
                        return Err(ConfigError::InvalidValue {
                            section: section.clone(),
                            option: line.to_string(),
                            reason: "expected 'option: value'".to_string(),
                        })
                    }
                };
                if key.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        section: section.clone(),
                        option: "<empty>".to_string(),
                        reason: "empty option name".to_string(),
                    });
                }
                cfg.data
                    .entry(section.clone())
                    .or_default()
                    .insert(key, value);
            } else {
                return Err(ConfigError::SectionNotFound(line.to_string()));
            }
        }
        Ok(cfg)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.data.contains_key(&section.to_lowercase())
    }

    /// Section names starting with `prefix` (e.g. `"probe "`), sorted for
    /// deterministic construction order.
    pub fn sections_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .data
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn raw(&self, section: &str, option: &str) -> Result<&str, ConfigError> {
        let sec = self
            .data
            .get(&section.to_lowercase())
            .ok_or_else(|| ConfigError::SectionNotFound(section.to_string()))?;
        sec.get(&option.to_lowercase())
            .map(String::as_str)
            .ok_or_else(|| ConfigError::OptionNotFound {
                section: section.to_string(),
                option: option.to_string(),
            })
    }

    /// Required string option.
    pub fn get(&self, section: &str, option: &str) -> Result<String, ConfigError> {
        self.raw(section, option).map(str::to_string)
    }

    /// Optional string option; `None` when the option (or section) is absent.
    pub fn get_opt(&self, section: &str, option: &str) -> Option<String> {
        self.raw(section, option).ok().map(str::to_string)
    }

    pub fn getfloat(
        &self,
        section: &str,
        option: &str,
        default: Option<f64>,
        minval: Option<f64>,
        maxval: Option<f64>,
        above: Option<f64>,
    ) -> Result<f64, ConfigError> {
        let value = match self.raw(section, option) {
            Ok(raw) => raw.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                section: section.to_string(),
                option: option.to_string(),
                reason: format!("unable to parse '{}' as float", raw),
            })?,
            Err(err) => match default {
                Some(d) => d,
                None => return Err(err),
            },
        };
        let bounds_err = |reason: String| ConfigError::InvalidValue {
            section: section.to_string(),
            option: option.to_string(),
            reason,
        };
        if let Some(min) = minval {
            if value < min {
                return Err(bounds_err(format!("{} below minimum {}", value, min)));
            }
        }
        if let Some(max) = maxval {
            if value > max {
                return Err(bounds_err(format!("{} above maximum {}", value, max)));
            }
        }
        if let Some(above) = above {
            if value <= above {
                return Err(bounds_err(format!("{} must be above {}", value, above)));
            }
        }
        Ok(value)
    }

    pub fn getint(
        &self,
        section: &str,
        option: &str,
        default: Option<i64>,
        minval: Option<i64>,
    ) -> Result<i64, ConfigError> {
        let value = match self.raw(section, option) {
            Ok(raw) => raw.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                section: section.to_string(),
                option: option.to_string(),
                reason: format!("unable to parse '{}' as integer", raw),
            })?,
            Err(err) => match default {
                Some(d) => d,
                None => return Err(err),
            },
        };
        if let Some(min) = minval {
            if value < min {
                return Err(ConfigError::InvalidValue {
                    section: section.to_string(),
                    option: option.to_string(),
                    reason: format!("{} below minimum {}", value, min),
                });
            }
        }
        Ok(value)
    }

    pub fn getboolean(
        &self,
        section: &str,
        option: &str,
        default: Option<bool>,
    ) -> Result<bool, ConfigError> {
        match self.raw(section, option) {
            Ok(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    section: section.to_string(),
                    option: option.to_string(),
                    reason: format!("unable to parse '{}' as boolean", other),
                }),
            },
            Err(err) => default.ok_or(err),
        }
    }

    pub fn getchoice(
        &self,
        section: &str,
        option: &str,
        choices: &[&str],
        default: Option<&str>,
    ) -> Result<String, ConfigError> {
        let value = match self.raw(section, option) {
            Ok(raw) => raw.to_lowercase(),
            Err(err) => match default {
                Some(d) => d.to_string(),
                None => return Err(err),
            },
        };
        if choices.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(ConfigError::InvalidValue {
                section: section.to_string(),
                option: option.to_string(),
                reason: format!("'{}' is not one of {:?}", value, choices),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# test machine
[printer]
kinematics: cartesian
max_velocity: 300
max_accel: 3000

[stepper_x]
position_min: 0
position_max: 200   ; travel
endstop_pin: ^PC2

[probe nozzle]
pin: PB1
z_offset: 1.5
";

    #[test]
    fn parses_sections_and_options() {
        let cfg = Configfile::parse(SAMPLE).unwrap();
        assert!(cfg.has_section("printer"));
        assert!(cfg.has_section("stepper_x"));
        assert_eq!(cfg.get("stepper_x", "endstop_pin").unwrap(), "^PC2");
        // inline comment stripped
        assert_eq!(
            cfg.getfloat("stepper_x", "position_max", None, None, None, None)
                .unwrap(),
            200.0
        );
    }

    #[test]
    fn defaults_and_bounds() {
        let cfg = Configfile::parse(SAMPLE).unwrap();
        assert_eq!(
            cfg.getfloat(
                "printer",
                "square_corner_velocity",
                Some(5.0),
                Some(0.0),
                None,
                None
            )
            .unwrap(),
            5.0
        );
        let err = cfg.getfloat("printer", "max_velocity", None, None, Some(100.0), None);
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
        let err = cfg.getfloat("printer", "missing", None, None, None, None);
        assert!(matches!(err, Err(ConfigError::OptionNotFound { .. })));
    }

    #[test]
    fn above_bound_is_strict() {
        let cfg = Configfile::parse("[s]\nv: 0.0\n").unwrap();
        assert!(cfg.getfloat("s", "v", None, None, None, Some(0.0)).is_err());
    }

    #[test]
    fn prefixed_sections() {
        let cfg = Configfile::parse(SAMPLE).unwrap();
        assert_eq!(cfg.sections_with_prefix("probe "), vec!["probe nozzle"]);
    }

    #[test]
    fn choice_validation() {
        let cfg = Configfile::parse(SAMPLE).unwrap();
        let kin = cfg
            .getchoice(
                "printer",
                "kinematics",
                &["cartesian", "cartesian_abc"],
                None,
            )
            .unwrap();
        assert_eq!(kin, "cartesian");
        assert!(cfg
            .getchoice("printer", "kinematics", &["corexy"], None)
            .is_err());
    }
}
