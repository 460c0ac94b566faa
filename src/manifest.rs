// Level 2 manifest checker: parses a Kubernetes Deployment manifest and runs
// the fixed checklist against it.
//
// The checker is pure. Persisting a passing manifest is the caller's job
// (see `progress::record_validation`).

use serde::Serialize;
use serde_yaml::{Mapping, Value};

pub const ERR_API_VERSION: &str = "apiVersion must be apps/v1";
pub const ERR_KIND: &str = "kind must be Deployment";
pub const ERR_METADATA_NAME: &str = "metadata.name is required";
pub const ERR_REPLICAS: &str = "spec.replicas must be >= 2";
pub const ERR_IMAGE: &str = "containers[0].image is required";
pub const ERR_PROBES: &str = "readinessProbe and livenessProbe are required";
pub const ERR_RESOURCES: &str = "resources.requests/limits (cpu,memory) are required";

const MIN_REPLICAS: i64 = 2;

/// The seven checks, serialized under their wire names
/// (`apiVersion`, `kindDeployment`, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub api_version: bool,
    pub kind_deployment: bool,
    pub metadata_name: bool,
    pub replicas: bool,
    pub image: bool,
    pub probes: bool,
    pub resources: bool,
}

impl Checklist {
    /// Checks in evaluation order, paired with the error reported on failure.
    pub fn items(&self) -> [(bool, &'static str); 7] {
        [
            (self.api_version, ERR_API_VERSION),
            (self.kind_deployment, ERR_KIND),
            (self.metadata_name, ERR_METADATA_NAME),
            (self.replicas, ERR_REPLICAS),
            (self.image, ERR_IMAGE),
            (self.probes, ERR_PROBES),
            (self.resources, ERR_RESOURCES),
        ]
    }

    pub fn all_passed(&self) -> bool {
        self.items().iter().all(|(passed, _)| *passed)
    }

    pub fn failed_count(&self) -> usize {
        self.items().iter().filter(|(passed, _)| !passed).count()
    }
}

/// Outcome of one validation call. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub checks: Checklist,
    #[serde(skip)]
    parse_failed: bool,
}

impl ValidationReport {
    fn parse_failure(detail: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            errors: vec![format!("YAML parse error: {detail}")],
            checks: Checklist::default(),
            parse_failed: true,
        }
    }

    fn from_checklist(checks: Checklist) -> Self {
        let errors = checks
            .items()
            .iter()
            .filter(|(passed, _)| !passed)
            .map(|(_, msg)| msg.to_string())
            .collect();
        Self {
            ok: checks.all_passed(),
            errors,
            checks,
            parse_failed: false,
        }
    }

    /// True when the input could not be parsed at all.
    pub fn is_parse_error(&self) -> bool {
        self.parse_failed
    }
}

/// Parse `text` and evaluate every check. Structural failures are reported in
/// the returned report; only unparseable input short-circuits.
pub fn evaluate(text: &str) -> ValidationReport {
    let doc = match parse_document(text) {
        Ok(doc) => doc,
        Err(e) => return ValidationReport::parse_failure(e),
    };
    ValidationReport::from_checklist(run_checks(&doc))
}

fn parse_document(text: &str) -> Result<Value, serde_yaml::Error> {
    // A stream with no document content is an empty document, not an error.
    // Bare `---` / `...` markers carry no content either.
    let mut starts = 0;
    let blank = text.lines().all(|line| {
        let line = line.trim();
        if line == "---" {
            starts += 1;
        }
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    });
    if blank && starts <= 1 {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(text)
}

fn run_checks(doc: &Value) -> Checklist {
    let root = as_mapping(doc);
    let container = first_container(root);

    Checklist {
        api_version: str_field(root, "apiVersion") == Some("apps/v1"),
        kind_deployment: str_field(root, "kind") == Some("Deployment"),
        metadata_name: check_metadata_name(root),
        replicas: check_replicas(root),
        image: container.is_some_and(|c| truthy(c.get("image"))),
        probes: container
            .is_some_and(|c| truthy(c.get("readinessProbe")) && truthy(c.get("livenessProbe"))),
        resources: container.is_some_and(check_resources),
    }
}

fn check_metadata_name(root: Option<&Mapping>) -> bool {
    root.and_then(|m| m.get("metadata"))
        .and_then(Value::as_mapping)
        .is_some_and(|meta| truthy(meta.get("name")))
}

fn check_replicas(root: Option<&Mapping>) -> bool {
    let replicas = root
        .and_then(|m| m.get("spec"))
        .and_then(Value::as_mapping)
        .and_then(|spec| spec.get("replicas"));
    // `Value::Number` never holds a bool, and `as_i64` rejects floats.
    match replicas {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|v| v >= MIN_REPLICAS)
            .or_else(|| n.as_u64().map(|_| true))
            .unwrap_or(false),
        _ => false,
    }
}

fn check_resources(container: &Mapping) -> bool {
    let Some(resources) = container.get("resources").and_then(Value::as_mapping) else {
        return false;
    };
    ["requests", "limits"].iter().all(|section| {
        resources
            .get(*section)
            .and_then(Value::as_mapping)
            .is_some_and(|s| truthy(s.get("cpu")) && truthy(s.get("memory")))
    })
}

/// Locate the pod spec under `spec.template`. Candidates are tried in order:
/// `template.spec`, then `template` itself; the first mapping that carries a
/// `containers` key wins. Without one, `template.spec` is used if it is a
/// mapping.
fn resolve_pod_spec(root: Option<&Mapping>) -> Option<&Mapping> {
    let template = root
        .and_then(|m| m.get("spec"))
        .and_then(Value::as_mapping)
        .and_then(|spec| spec.get("template"))
        .and_then(Value::as_mapping)?;
    let template_spec = template.get("spec").and_then(Value::as_mapping);

    [template_spec, Some(template)]
        .into_iter()
        .flatten()
        .find(|candidate| candidate.contains_key("containers"))
        .or(template_spec)
}

fn first_container(root: Option<&Mapping>) -> Option<&Mapping> {
    resolve_pod_spec(root)?
        .get("containers")?
        .as_sequence()?
        .first()?
        .as_mapping()
}

/// The top-level mapping, or `None` for null/falsy/non-mapping documents,
/// which simply have no fields.
fn as_mapping(doc: &Value) -> Option<&Mapping> {
    match doc {
        Value::Tagged(tagged) => as_mapping(&tagged.value),
        other => other.as_mapping(),
    }
}

fn str_field<'a>(map: Option<&'a Mapping>, key: &str) -> Option<&'a str> {
    map?.get(key)?.as_str()
}

/// Plain scalars that YAML 1.1 resolves to `false` but the 1.2 core schema
/// reads as strings.
const YAML11_FALSE: [&str; 11] = [
    "n", "N", "no", "No", "NO", "off", "Off", "OFF", "false", "False", "FALSE",
];

/// YAML truthiness: null, false, zero, empty strings and empty collections
/// are false. YAML 1.1 false spellings (`no`, `off`, ...) count as false.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty() && !YAML11_FALSE.contains(&s.as_str()),
        Some(Value::Sequence(seq)) => !seq.is_empty(),
        Some(Value::Mapping(map)) => !map.is_empty(),
        Some(Value::Tagged(tagged)) => truthy(Some(&tagged.value)),
    }
}
