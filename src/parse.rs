use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::case::*;
use crate::config::EngineConfig;
use crate::error::{DataError, ParseError};

/// Typed records read from one or more OpenDSS-style files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeederRecords {
    pub circuit: Option<String>,
    pub source: Option<BusId>,
    pub lines: Vec<Line>,
    pub loads: Vec<LoadEntry>,
}

impl FeederRecords {
    /// Append records from a second file (e.g. a separate loads file).
    pub fn merge(&mut self, other: FeederRecords) -> Result<(), ParseError> {
        if let (Some(_), Some(second)) = (&self.source, &other.source) {
            return Err(ParseError::new(
                0,
                format!("second circuit definition with source {second}"),
            ));
        }
        if self.source.is_none() {
            self.source = other.source;
            self.circuit = other.circuit;
        }
        self.lines.extend(other.lines);
        self.loads.extend(other.loads);
        Ok(())
    }

    /// Source bus, falling back to the OpenDSS default name.
    pub fn source_or_default(&self) -> BusId {
        self.source
            .clone()
            .unwrap_or_else(|| BusId::new("sourcebus"))
    }
}

/// One logical statement after comment stripping and `~` continuation.
struct Statement {
    line: usize,
    text: String,
}

/// strip `!` and `//` comments
fn strip_comment(s: &str) -> &str {
    let cut = [s.find('!'), s.find("//")].into_iter().flatten().min();
    match cut {
        Some(idx) => &s[..idx],
        None => s,
    }
}

fn statements(content: &str) -> Vec<Statement> {
    let mut out: Vec<Statement> = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let trimmed = strip_comment(raw).trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix('~') {
            // continuation of the previous statement; dangling ones are dropped below
            if let Some(prev) = out.last_mut() {
                prev.text.push(' ');
                prev.text.push_str(rest.trim());
                continue;
            }
        }
        out.push(Statement {
            line: idx + 1,
            text: trimmed.to_string(),
        });
    }
    out
}

/// Split on whitespace outside of brackets and quotes.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') | (None, '(') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') | (None, ')') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, c) if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    // re-join "key = value" written with spaces around '='; a token that is
    // itself a key=value pair starts a new parameter
    let mut joined: Vec<String> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let glue = token.starts_with('=')
            || (!token.contains('=') && joined.last().is_some_and(|t| t.ends_with('=')));
        match joined.last_mut() {
            Some(prev) if glue => prev.push_str(&token),
            _ => joined.push(token),
        }
    }
    joined
}

/// strip brackets or quotes from a value
fn strip_extras(s: &str) -> String {
    s.trim()
        .trim_matches(|c| matches!(c, '[' | ']' | '(' | ')' | '"' | '\''))
        .trim()
        .to_string()
}

fn list_values(s: &str) -> Vec<String> {
    strip_extras(s)
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn truthy(s: &str) -> bool {
    matches!(
        strip_extras(s).to_ascii_lowercase().as_str(),
        "y" | "yes" | "t" | "true" | "1"
    )
}

/// Element class, name, and `key=value` pairs of a `New` statement.
struct Declaration {
    line: usize,
    class: String,
    name: String,
    params: Vec<(String, String)>,
}

impl Declaration {
    fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, key: &str) -> Result<&str, ParseError> {
        let value = self.get(key).ok_or_else(|| {
            ParseError::new(
                self.line,
                format!("{}.{} is missing required '{}'", self.class, self.name, key),
            )
        })?;
        if strip_extras(value).is_empty() {
            return Err(ParseError::new(
                self.line,
                format!("{}.{} has an empty value for '{}'", self.class, self.name, key),
            ));
        }
        Ok(value)
    }

    fn require_f64(&self, key: &str) -> Result<f64, ParseError> {
        let raw = strip_extras(self.require(key)?);
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ParseError::new(
                    self.line,
                    format!("{}.{}: '{}' is not a number: {}", self.class, self.name, key, raw),
                )
            })
    }
}

/// Parse a `New <class>.<name> k=v ...` statement. Returns `None` for any
/// other command (`Redirect`, `Set`, `Solve`, ...).
fn declaration(stmt: &Statement) -> Result<Option<Declaration>, ParseError> {
    let tokens = tokenize(&stmt.text);
    let Some(verb) = tokens.first() else {
        return Ok(None);
    };
    if !verb.eq_ignore_ascii_case("new") {
        debug!("line {}: skipping command '{}'", stmt.line, verb);
        return Ok(None);
    }

    let object = tokens
        .get(1)
        .ok_or_else(|| ParseError::new(stmt.line, "'New' without an element"))?;
    let object = match object.split_once('=') {
        Some((key, value)) if key.eq_ignore_ascii_case("object") => value,
        _ => object.as_str(),
    };
    let (class, name) = object.split_once('.').ok_or_else(|| {
        ParseError::new(stmt.line, format!("element '{object}' is not of the form class.name"))
    })?;
    if name.trim().is_empty() {
        return Err(ParseError::new(stmt.line, format!("element '{object}' has no name")));
    }

    let mut params = Vec::with_capacity(tokens.len().saturating_sub(2));
    for token in &tokens[2..] {
        match token.split_once('=') {
            Some((key, value)) => params.push((key.trim().to_ascii_lowercase(), value.to_string())),
            None => {
                return Err(ParseError::new(
                    stmt.line,
                    format!("positional parameter '{token}' in {object} is not supported"),
                ));
            }
        }
    }

    Ok(Some(Declaration {
        line: stmt.line,
        class: class.trim().to_ascii_lowercase(),
        name: name.trim().to_ascii_lowercase(),
        params,
    }))
}

fn classify_line(decl: &Declaration, config: &EngineConfig) -> LineKind {
    let is_switch = match decl.get("switch") {
        Some(flag) => truthy(flag),
        None => decl
            .name
            .starts_with(&config.switch_prefix.to_ascii_lowercase()),
    };
    if !is_switch {
        return LineKind::Fixed;
    }
    let declared_open = decl
        .get("normal")
        .is_some_and(|n| strip_extras(n).eq_ignore_ascii_case("open"));
    if declared_open || config.is_normally_open(&decl.name) {
        LineKind::Na
    } else {
        LineKind::Nf
    }
}

/// Parses OpenDSS-style feeder text into typed records.
///
/// Fails on the first malformed `Line`, `Transformer`, `Load`, or `Circuit`
/// declaration. Element classes the engine has no use for are skipped.
pub fn parse_feeder_str(content: &str, config: &EngineConfig) -> Result<FeederRecords, ParseError> {
    let mut records = FeederRecords::default();

    for stmt in statements(content) {
        let Some(decl) = declaration(&stmt)? else {
            continue;
        };

        match decl.class.as_str() {
            "circuit" => {
                if records.circuit.is_some() {
                    return Err(ParseError::new(
                        decl.line,
                        format!("second circuit definition '{}'", decl.name),
                    ));
                }
                let source = decl
                    .get("bus1")
                    .map(|b| BusId::new(&strip_extras(b)))
                    .unwrap_or_else(|| BusId::new("sourcebus"));
                records.source = Some(source);
                records.circuit = Some(decl.name.clone());
            }

            "line" => {
                let bus1 = strip_extras(decl.require("bus1")?);
                let bus2 = strip_extras(decl.require("bus2")?);
                let kind = classify_line(&decl, config);
                records.lines.push(Line::new(&decl.name, &bus1, &bus2, kind));
            }

            "transformer" => {
                // windings given either as buses=[a b ...] or repeated bus=
                let mut buses: Vec<String> = decl.get("buses").map(list_values).unwrap_or_default();
                buses.extend(decl.all("bus").map(strip_extras));
                if buses.len() < 2 {
                    return Err(ParseError::new(
                        decl.line,
                        format!("transformer.{} needs at least two buses", decl.name),
                    ));
                }
                for (w, pair) in buses.windows(2).enumerate() {
                    let name = if w == 0 {
                        decl.name.clone()
                    } else {
                        format!("{}#{}", decl.name, w + 1)
                    };
                    records
                        .lines
                        .push(Line::new(&name, &pair[0], &pair[1], LineKind::Fixed));
                }
            }

            "load" => {
                let bus = strip_extras(decl.require("bus1")?);
                let kw = decl.require_f64("kw")?;
                records.loads.push(LoadEntry::new(&decl.name, &bus, kw));
            }

            other => debug!("line {}: ignoring element class '{}'", decl.line, other),
        }
    }

    Ok(records)
}

/// Reads a feeder file from disk. A missing or unreadable file is fatal.
pub fn read_feeder(
    path: &Path,
    kind: &'static str,
    config: &EngineConfig,
) -> Result<FeederRecords, DataError> {
    let content = fs::read(path).map_err(|source| DataError::Missing {
        kind,
        path: path.to_path_buf(),
        source,
    })?;
    let content = String::from_utf8_lossy(&content);

    let records = parse_feeder_str(&content, config).map_err(|source| DataError::Malformed {
        kind,
        path: path.to_path_buf(),
        source,
    })?;

    if records.lines.is_empty() && records.loads.is_empty() {
        warn!("{} contains no lines or loads", path.display());
    }
    info!(
        "Parsed {} lines, {} loads from {}",
        records.lines.len(),
        records.loads.len(),
        path.display()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEEDER: &str = r#"
Clear
New Circuit.ieee123 basekv=4.16 Bus1=150 pu=1.00 ! substation
Redirect IEEELineCodes.DSS

New Transformer.reg1a phases=3 windings=2 buses=[150 150r] conns=[wye wye]
New Line.L1  Phases=3 Bus1=150r.1.2.3 Bus2=1.1.2.3 LineCode=1 Length=0.4
New Line.sw1 phases=3 Bus1=1 Bus2=2 Switch=y r1=1e-3
New Line.sw7 phases=3 Bus1=2 Bus2=3
~ Switch=y Normal=open
New Line.tieX Bus1=3 Bus2=4 switch=no
New Regcontrol.creg1a transformer=reg1a winding=2
New Load.S1a Bus1=1.1 Phases=1 Conn=Wye Model=1 kV=2.4 kW=40.0 kvar=20.0
New Load.S1b Bus1=1.2 kW = 15.5
// trailing comment
Solve
"#;

    #[test]
    fn parses_circuit_lines_and_loads() {
        let records = parse_feeder_str(FEEDER, &EngineConfig::default()).unwrap();
        assert_eq!(records.circuit.as_deref(), Some("ieee123"));
        assert_eq!(records.source, Some(BusId::new("150")));

        let names: Vec<&str> = records.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["reg1a", "l1", "sw1", "sw7", "tiex"]);

        let l1 = &records.lines[1];
        assert_eq!(l1.from_bus, BusId::new("150r"));
        assert_eq!(l1.to_bus, BusId::new("1"));
        assert_eq!(l1.kind, LineKind::Fixed);

        assert_eq!(records.lines[2].kind, LineKind::Nf);
        assert_eq!(records.lines[3].kind, LineKind::Na);
        assert_eq!(records.lines[4].kind, LineKind::Fixed);

        assert_eq!(records.loads.len(), 2);
        assert_eq!(records.loads[1].kw, 15.5);
        assert!(records.loads.iter().all(|l| l.bus == BusId::new("1")));
    }

    #[test]
    fn prefix_and_config_decide_switch_kind() {
        let text = "New Line.sw2 Bus1=a Bus2=b\nNew Line.sw8 Bus1=b Bus2=c\n";
        let config = EngineConfig {
            normally_open: vec!["SW8".to_string()],
            ..EngineConfig::default()
        };
        let records = parse_feeder_str(text, &config).unwrap();
        assert_eq!(records.lines[0].kind, LineKind::Nf);
        assert_eq!(records.lines[1].kind, LineKind::Na);
    }

    #[test]
    fn missing_bus_is_an_error_with_line_number() {
        let text = "New Circuit.x bus1=s\n\nNew Line.l2 Bus1=a\n";
        let err = parse_feeder_str(text, &EngineConfig::default()).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("bus2"), "{}", err.message);
    }

    #[test]
    fn empty_value_is_reported_against_its_own_key() {
        let text = "New Line.l2 Bus1= Bus2=a\n";
        let err = parse_feeder_str(text, &EngineConfig::default()).unwrap_err();
        assert!(err.message.contains("empty value for 'bus1'"), "{}", err.message);
    }

    #[test]
    fn spaces_around_equals_are_rejoined() {
        let text = "New Line.l2 Bus1 = a Bus2 =b\nNew Load.x Bus1=a kW= 2.5\n";
        let records = parse_feeder_str(text, &EngineConfig::default()).unwrap();
        assert_eq!(records.lines[0].from_bus, BusId::new("a"));
        assert_eq!(records.lines[0].to_bus, BusId::new("b"));
        assert_eq!(records.loads[0].kw, 2.5);
    }

    #[test]
    fn bad_kw_is_an_error() {
        let text = "New Load.x Bus1=a kW=lots\n";
        let err = parse_feeder_str(text, &EngineConfig::default()).unwrap_err();
        assert!(err.message.contains("not a number"), "{}", err.message);
    }

    #[test]
    fn load_without_kw_is_an_error() {
        let text = "New Load.x Bus1=a kvar=3\n";
        assert!(parse_feeder_str(text, &EngineConfig::default()).is_err());
    }

    #[test]
    fn second_circuit_is_rejected() {
        let text = "New Circuit.a bus1=x\nNew Circuit.b bus1=y\n";
        let err = parse_feeder_str(text, &EngineConfig::default()).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn transformer_with_repeated_bus_keys() {
        let text = "New Transformer.t1 wdg=1 bus=a.1 wdg=2 bus=b wdg=3 bus=c\n";
        let records = parse_feeder_str(text, &EngineConfig::default()).unwrap();
        assert_eq!(records.lines.len(), 2);
        assert_eq!(records.lines[1].name, "t1#2");
        assert_eq!(records.lines[1].from_bus, BusId::new("b"));
    }

    #[test]
    fn merge_keeps_a_single_source() {
        let mut a = parse_feeder_str("New Circuit.a bus1=s\n", &EngineConfig::default()).unwrap();
        let b = parse_feeder_str("New Load.x bus1=q kw=1\n", &EngineConfig::default()).unwrap();
        a.merge(b).unwrap();
        assert_eq!(a.source_or_default(), BusId::new("s"));
        assert_eq!(a.loads.len(), 1);

        let c = parse_feeder_str("New Circuit.c bus1=t\n", &EngineConfig::default()).unwrap();
        assert!(a.merge(c).is_err());
    }

    #[test]
    fn missing_file_is_data_error() {
        let err = read_feeder(
            Path::new("/nonexistent/feeder.dss"),
            "topology",
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DataError::Missing { kind: "topology", .. }));
    }
}
