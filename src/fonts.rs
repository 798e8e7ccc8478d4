// fonts.rs: runtime font discovery shared by the egui overlay and the placeholder caption
//
// ab_glyph handles .ttc poorly, so .ttf/.otf come first; a candidate that
// fails to parse is skipped.

use log::{info, warn};
use once_cell::sync::Lazy;
use std::path::PathBuf;

pub struct UiFont {
    pub bytes: Vec<u8>,
    pub font: ab_glyph::FontArc,
}

static UI_FONT: Lazy<Option<UiFont>> = Lazy::new(load_ui_font);

/// First usable font on this machine, searched once.
pub fn ui_font() -> Option<&'static UiFont> {
    UI_FONT.as_ref()
}

fn candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if cfg!(windows) {
        let win_fonts = PathBuf::from(r"C:\Windows\Fonts");
        for f in ["segoeui.ttf", "arial.ttf", "tahoma.ttf", "msyh.ttf", "malgun.ttf"] {
            candidates.push(win_fonts.join(f));
        }
    } else if cfg!(target_os = "macos") {
        for p in [
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/Library/Fonts/NotoSansSC-Regular.otf",
            "/System/Library/Fonts/Helvetica.ttc",
        ] {
            candidates.push(PathBuf::from(p));
        }
    } else if cfg!(unix) {
        for p in [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
            "/usr/share/fonts/opentype/noto/NotoSansSC-Regular.otf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        ] {
            candidates.push(PathBuf::from(p));
        }
        if let Ok(home) = std::env::var("HOME") {
            let home = PathBuf::from(home);
            candidates.push(home.join(".local/share/fonts/NotoSans-Regular.ttf"));
            candidates.push(home.join(".fonts/NotoSans-Regular.ttf"));
        }
    }

    // bundled assets next to the executable or in the working directory
    let asset_files = ["NotoSans-Regular.ttf", "NotoSansSC-Regular.otf", "DejaVuSans.ttf"];
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            for f in asset_files {
                candidates.push(dir.join("assets").join(f));
            }
        }
    }
    for f in asset_files {
        candidates.push(PathBuf::from("assets").join(f));
    }

    candidates
}

fn load_ui_font() -> Option<UiFont> {
    for path in candidates() {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match ab_glyph::FontArc::try_from_vec(bytes.clone()) {
            Ok(font) => {
                info!("{}", crate::i18n::tr_with("font.using", &[("path", path.display().to_string())]));
                return Some(UiFont { bytes, font });
            }
            Err(_) => continue,
        }
    }
    warn!("{}", crate::i18n::tr("font.not_found"));
    None
}

/// Put the discovered font in front of egui's defaults.
pub fn setup_egui_fonts(ctx: &egui::Context) {
    let Some(ui) = ui_font() else {
        return;
    };

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("ui".to_owned(), egui::FontData::from_owned(ui.bytes.clone()));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}
