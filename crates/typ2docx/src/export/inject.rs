use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object};

use crate::error::{ConvertError, Result};

/// Document-level script template; the port constant is prepended.
pub const EXPORT_SCRIPT: &str = include_str!("../../assets/export.js");

const SCRIPT_NAME: &str = "typ2docx";

/// Full script injected into the PDF for a listener on `port`.
pub fn export_script(port: u16) -> String {
    format!("const PORT = {};\n{}", port, EXPORT_SCRIPT)
}

/// Copies `src` to `dst` with `script` registered as document-level
/// JavaScript, so it runs when the document is opened.
///
/// Existing name trees (destinations, embedded files) are preserved.
pub fn inject_script(src: &Path, dst: &Path, script: &str) -> Result<()> {
    let _span = tracing::debug_span!("export.inject", pdf = %src.display()).entered();
    let fail = |reason: String| ConvertError::ScriptInjection {
        path: src.to_path_buf(),
        reason,
    };

    let mut doc = Document::load(src).map_err(|e| fail(e.to_string()))?;

    let action_id = doc.add_object(dictionary! {
        "S" => "JavaScript",
        "JS" => Object::string_literal(script),
    });
    let tree = dictionary! {
        "Names" => vec![Object::string_literal(SCRIPT_NAME), action_id.into()],
    };

    let existing = doc
        .catalog()
        .map_err(|e| fail(e.to_string()))?
        .get(b"Names")
        .ok()
        .cloned();

    match existing {
        Some(Object::Reference(names_id)) => {
            doc.get_dictionary_mut(names_id)
                .map_err(|e| fail(e.to_string()))?
                .set("JavaScript", tree);
        }
        Some(Object::Dictionary(mut names)) => {
            names.set("JavaScript", tree);
            doc.catalog_mut()
                .map_err(|e| fail(e.to_string()))?
                .set("Names", names);
        }
        _ => {
            let mut names = Dictionary::new();
            names.set("JavaScript", tree);
            doc.catalog_mut()
                .map_err(|e| fail(e.to_string()))?
                .set("Names", names);
        }
    }

    doc.save(dst).map_err(|e| ConvertError::ScriptInjection {
        path: dst.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Reads back the document-level script registered by [`inject_script`].
pub fn read_injected_script(pdf: &Path) -> Result<String> {
    let fail = |reason: &str| ConvertError::ScriptInjection {
        path: pdf.to_path_buf(),
        reason: reason.to_string(),
    };

    let doc = Document::load(pdf).map_err(|e| fail(&e.to_string()))?;
    let catalog = doc.catalog().map_err(|e| fail(&e.to_string()))?;

    let names = resolve_dict(&doc, catalog.get(b"Names").ok()).ok_or_else(|| fail("no name tree"))?;
    let scripts =
        resolve_dict(&doc, names.get(b"JavaScript").ok()).ok_or_else(|| fail("no JavaScript tree"))?;
    let entries = scripts
        .get(b"Names")
        .and_then(Object::as_array)
        .map_err(|_| fail("empty JavaScript tree"))?;

    let mut pairs = entries.chunks(2);
    while let Some([name, action]) = pairs.next() {
        if !matches!(name, Object::String(bytes, _) if bytes.as_slice() == SCRIPT_NAME.as_bytes()) {
            continue;
        }
        let action = resolve_dict(&doc, Some(action)).ok_or_else(|| fail("bad script action"))?;
        return match action.get(b"JS") {
            Ok(Object::String(bytes, _)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            _ => Err(fail("script action has no JS string")),
        };
    }
    Err(fail("typ2docx script not found"))
}

fn resolve_dict<'a>(doc: &'a Document, object: Option<&'a Object>) -> Option<&'a Dictionary> {
    match object? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}
