// i18n.rs: runtime UI strings
//
// - Strings live in either:
//   A) assets/i18n/<lang>.json
//   B) assets/i18n.json (single file, format: { "<lang>": { "key": "value" } })
// - Load order: selected lang -> fallback en -> the key itself
// - Lookup: tr("key") / tr_with("key", [("name", "...")]) with {name} placeholders

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

const FALLBACK_LANG: &str = "en";

#[derive(Debug, Clone)]
struct Catalog {
    lang: String,
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

static CATALOG: OnceCell<RwLock<Catalog>> = OnceCell::new();

fn load_json_map(path: &Path) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn load_multi_lang_json(path: &Path, lang: &str) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut all: HashMap<String, HashMap<String, String>> = serde_json::from_str(&text).ok()?;
    all.remove(lang)
}

/// `<exe_dir>/assets/<rel>` first, then `./assets/<rel>`.
fn find_asset(rel: &Path) -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join(rel);
            if p.exists() {
                return Some(p);
            }
        }
    }
    let p = PathBuf::from("assets").join(rel);
    p.exists().then_some(p)
}

fn load_lang(lang: &str) -> HashMap<String, String> {
    let per_lang = Path::new("i18n").join(format!("{}.json", lang));
    if let Some(m) = find_asset(&per_lang).and_then(|p| load_json_map(&p)) {
        return m;
    }
    find_asset(Path::new("i18n.json"))
        .and_then(|p| load_multi_lang_json(&p, lang))
        .unwrap_or_default()
}

/// Initialize the global catalog. Later calls switch language.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let map = load_lang(&lang);
    let fallback_map = if lang == FALLBACK_LANG {
        map.clone()
    } else {
        load_lang(FALLBACK_LANG)
    };
    if map.is_empty() {
        log::warn!("no strings found for language {}", lang);
    }

    let catalog = Catalog {
        lang,
        map,
        fallback_map,
    };

    if let Some(lock) = CATALOG.get() {
        if let Ok(mut w) = lock.write() {
            *w = catalog;
        }
    } else {
        let _ = CATALOG.set(RwLock::new(catalog));
    }
}

pub fn current_lang() -> String {
    CATALOG
        .get()
        .and_then(|l| l.read().ok().map(|c| c.lang.clone()))
        .unwrap_or_else(|| FALLBACK_LANG.to_string())
}

/// Localized text by key. Missing keys return the key itself.
pub fn tr(key: &str) -> String {
    let Some(catalog) = CATALOG.get().and_then(|l| l.read().ok()) else {
        return key.to_string();
    };
    catalog
        .map
        .get(key)
        .or_else(|| catalog.fallback_map.get(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

/// Localized text with `{name}` placeholders substituted; unknown placeholders stay as-is.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    substitute(tr(key), args)
}

fn substitute(mut s: String, args: &[(&str, String)]) -> String {
    for (k, v) in args {
        s = s.replace(&format!("{{{}}}", k), v);
    }
    s
}
