//! pkg-config file emission
//!
//! Variables may reference each other with `${name}`; they are emitted in
//! dependency order so `pkg-config` can expand them in one pass.

use std::collections::BTreeMap;

/// Content of a `.pc` file before emission
#[derive(Debug, Clone, Default)]
pub struct PcFile {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub cflags: Option<String>,
    pub libs: Option<String>,
    pub requires: Option<String>,
    pub vars: BTreeMap<String, String>,
}

impl PcFile {
    /// Render the file content
    ///
    /// # Errors
    ///
    /// Returns a message when variable references form a cycle.
    pub fn emit(&self) -> Result<String, String> {
        let ordered = self.sorted_vars()?;

        let mut out = String::new();
        for (name, value) in &ordered {
            out.push_str(name);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        if !ordered.is_empty() {
            out.push('\n');
        }

        out.push_str(&format!("Name: {}\n", self.name));
        if let Some(description) = &self.description {
            out.push_str(&format!("Description: {description}\n"));
        }
        out.push_str(&format!("Version: {}\n", self.version));
        if let Some(requires) = &self.requires {
            out.push_str(&format!("Requires: {requires}\n"));
        }
        if let Some(libs) = &self.libs {
            out.push_str(&format!("Libs: {libs}\n"));
        }
        if let Some(cflags) = &self.cflags {
            out.push_str(&format!("Cflags: {cflags}\n"));
        }
        Ok(out)
    }

    /// Topological order on `${}` references between variables
    fn sorted_vars(&self) -> Result<Vec<(String, String)>, String> {
        let mut ordered = Vec::new();
        let mut state: BTreeMap<&str, VisitState> = BTreeMap::new();

        for name in self.vars.keys() {
            self.visit(name, &mut state, &mut ordered)?;
        }
        Ok(ordered)
    }

    fn visit<'a>(
        &'a self,
        name: &str,
        state: &mut BTreeMap<&'a str, VisitState>,
        ordered: &mut Vec<(String, String)>,
    ) -> Result<(), String> {
        match state.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                return Err(format!("variable cycle through `{name}`"));
            }
            None => {}
        }
        let Some((key, value)) = self.vars.get_key_value(name) else {
            // references to undefined names are left for pkg-config to report
            return Ok(());
        };
        state.insert(key.as_str(), VisitState::InProgress);
        for referenced in references(value) {
            self.visit(&referenced, state, ordered)?;
        }
        state.insert(key.as_str(), VisitState::Done);
        ordered.push((key.clone(), value.clone()));
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

/// Names referenced as `${name}` inside a value
fn references(value: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        rest = &rest[start + 2..];
        if let Some(end) = rest.find('}') {
            refs.push(rest[..end].to_string());
            rest = &rest[end + 1..];
        } else {
            break;
        }
    }
    refs
}
