//! Packaging templates rendered by literal placeholder substitution.

use forge_common::Result;

use crate::workspace::Workspace;

const INDEX_JS: &str = include_str!("../templates/index.js");
const PACKAGE_JSON: &str = include_str!("../templates/package.json");
const README_MD: &str = include_str!("../templates/README.md");

/// Values substituted for `%%key%%` markers.
pub struct TemplateVars<'a> {
    pub package_name: &'a str,
    pub circuit_name: &'a str,
    pub snarkjs_version: &'a str,
    pub protocol: &'a str,
    pub wasm_path: &'a str,
    pub pkey_path: &'a str,
    pub vkey: &'a str,
}

pub fn render(template: &str, vars: &TemplateVars<'_>) -> String {
    template
        .replace("%%package_name%%", vars.package_name)
        .replace("%%circuit_name%%", vars.circuit_name)
        .replace("%%snarkjs_version%%", vars.snarkjs_version)
        .replace("%%protocol%%", vars.protocol)
        .replace("%%wasm_path%%", vars.wasm_path)
        .replace("%%pkey_path%%", vars.pkey_path)
        .replace("%%vkey%%", vars.vkey)
}

/// Write the rendered `index.js`, `package.json`, and `README.md` into the
/// workspace root so the packaged bundle can prove and verify on its own.
pub fn write_package_files(workspace: &Workspace, vars: &TemplateVars<'_>) -> Result<()> {
    for (name, template) in [
        ("index.js", INDEX_JS),
        ("package.json", PACKAGE_JSON),
        ("README.md", README_MD),
    ] {
        std::fs::write(workspace.root.join(name), render(template, vars))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>() -> TemplateVars<'a> {
        TemplateVars {
            package_name: "multiplier-swift-red-fox",
            circuit_name: "multiplier",
            snarkjs_version: "0.7.4",
            protocol: "plonk",
            wasm_path: "build/verify_circuit/verify_circuit_js/verify_circuit.wasm",
            pkey_path: "build/verify_circuit/plonk_pkey.zkey",
            vkey: "{\"protocol\":\"plonk\"}",
        }
    }

    #[test]
    fn test_render_replaces_every_marker() {
        for template in [INDEX_JS, PACKAGE_JSON, README_MD] {
            let rendered = render(template, &vars());
            assert!(!rendered.contains("%%"), "unreplaced marker in output");
        }
    }

    #[test]
    fn test_package_json_is_valid_json_after_render() {
        let rendered = render(PACKAGE_JSON, &vars());
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["name"], "multiplier-swift-red-fox");
        assert_eq!(parsed["dependencies"]["snarkjs"], "0.7.4");
    }

    #[test]
    fn test_repeated_markers_all_replaced() {
        let rendered = render(INDEX_JS, &vars());
        assert!(rendered.matches("plonk").count() >= 3);
    }
}
