//! Narrow one-off fixups run around the main install pass.

use crate::error::{PatchError, PatchResult};
use crate::runner::PrivilegedRunner;
use phoenix_core::kernel::{SONOMA, VENTURA};
use phoenix_core::{HardwareProfile, OsInfo};
use plist::Value;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SNB_FRAMEBUFFER: &str =
    "10.13.6/System/Library/Extensions/AppleIntelSNBGraphicsFB.kext/Contents/MacOS/AppleIntelSNBGraphicsFB";

/// Board ids compiled into AppleIntelSNBGraphicsFB.
const SANDY_STOCK_BOARDS: [(&str, &str); 12] = [
    ("MacBookPro8,1", "Mac-94245B3640C91C81"),
    ("MacBookPro8,2", "Mac-94245A3940C91C80"),
    ("MacBookPro8,3", "Mac-942459F5819B171B"),
    ("MacBookAir4,1", "Mac-C08A6BB70A942AC2"),
    ("MacBookAir4,2", "Mac-742912EFDBEE19B3"),
    ("Macmini5,1", "Mac-8ED6AF5B48C039E1"),
    ("Macmini5,2", "Mac-4BC72D62AD45599E"),
    ("Macmini5,3", "Mac-7BA5B2794B2CDB12"),
    ("iMac12,1", "Mac-942B5BF58194151B"),
    ("iMac12,2", "Mac-942B59F58194171B"),
    ("AppleInternal MacBookPro8,3", "Mac-94245AF5819B141B"),
    ("AppleInternal iMac12,2", "Mac-942B5B3A40C91381"),
];

/// Panel sizes that move a laptop off the 13" default.
const SCREEN_SIZES: [(&str, u32); 24] = [
    ("MacBookPro5,1", 15),
    ("MacBookPro5,2", 17),
    ("MacBookPro5,3", 15),
    ("MacBookPro5,4", 15),
    ("MacBookPro6,1", 17),
    ("MacBookPro6,2", 15),
    ("MacBookPro8,2", 15),
    ("MacBookPro8,3", 17),
    ("MacBookPro9,1", 15),
    ("MacBookPro10,1", 15),
    ("MacBookPro11,2", 15),
    ("MacBookPro11,3", 15),
    ("MacBookPro11,4", 15),
    ("MacBookPro11,5", 15),
    ("MacBookPro13,3", 15),
    ("MacBookPro14,3", 15),
    ("MacBookPro15,1", 15),
    ("MacBookPro15,3", 15),
    ("MacBookPro16,1", 16),
    ("MacBookPro16,4", 16),
    ("MacBookAir3,1", 11),
    ("MacBookAir4,1", 11),
    ("MacBookAir5,1", 11),
    ("MacBookAir6,1", 11),
];

fn board_for(model: &str) -> &'static str {
    SANDY_STOCK_BOARDS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, board)| *board)
        .unwrap_or("Mac-8ED6AF5B48C039E1")
}

fn screen_size(model: &str) -> u32 {
    if let Some((_, size)) = SCREEN_SIZES.iter().find(|(name, _)| *name == model) {
        return *size;
    }
    if ["MacBook8,1", "MacBook9,1", "MacBook10,1"].contains(&model) {
        return 12;
    }
    13
}

/// The stock board whose framebuffer layout is closest to this machine.
pub fn best_sandy_board(profile: &HardwareProfile) -> &'static str {
    let model = profile.model.as_str();
    if model.starts_with("MacBookPro") {
        let size = screen_size(model);
        return if size >= 17 {
            board_for("MacBookPro8,3")
        } else if size >= 15 {
            board_for("MacBookPro8,2")
        } else {
            board_for("MacBookPro8,1")
        };
    }
    if model.starts_with("MacBook") {
        return if screen_size(model) >= 13 {
            board_for("MacBookAir4,2")
        } else {
            board_for("MacBookAir4,1")
        };
    }
    // More than one GPU on a desktop means the iGPU runs headless.
    if !model.is_empty() && profile.gpus.len() > 1 {
        return if model.starts_with("Macmini") {
            board_for("Macmini5,2")
        } else {
            board_for("iMac12,2")
        };
    }
    board_for("Macmini5,1")
}

/// Rewrites a stock board id inside the Sandy Bridge framebuffer so it accepts
/// the reported one. Returns the replaced board, or `None` when the board is stock.
pub fn patch_sandy_board_id(payload_root: &Path, profile: &HardwareProfile, dry_run: bool) -> PatchResult<Option<&'static str>> {
    let reported = profile.reported_board_id.as_str();
    if SANDY_STOCK_BOARDS.iter().any(|(_, board)| *board == reported) {
        return Ok(None);
    }
    let target = best_sandy_board(profile);
    info!("patching AppleIntelSNBGraphicsFB: {} -> {}", target, reported);

    let mut replacement = reported.as_bytes().to_vec();
    if replacement.len() > target.len() {
        return Err(PatchError::PreconditionFailed(format!(
            "board id {reported} is longer than {target}"
        )));
    }
    replacement.resize(target.len(), 0);

    let path = payload_root.join(SNB_FRAMEBUFFER);
    if !path.exists() {
        return Err(PatchError::PreconditionMissing { path });
    }
    let data = fs::read(&path)?;
    let patched = replace_all(&data, target.as_bytes(), &replacement);
    if !dry_run {
        fs::write(&path, patched)?;
    }
    Ok(Some(target))
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut idx = 0;
    while idx < haystack.len() {
        if !needle.is_empty() && haystack[idx..].starts_with(needle) {
            out.extend_from_slice(replacement);
            idx += needle.len();
        } else {
            out.push(haystack[idx]);
            idx += 1;
        }
    }
    out
}

/// Legacy GCN regenerates corrupted opaque shaders from the WindowServer cache;
/// clear it and lock the folder.
pub fn disable_window_server_caching(runner: &dyn PrivilegedRunner, os: &OsInfo) -> PatchResult<()> {
    if os.major() < VENTURA {
        return Ok(());
    }
    info!("disabling WindowServer caching");
    // Globs need a shell.
    runner.run(
        "/bin/bash",
        &["-c", "/bin/rm -rf /private/var/folders/*/*/*/WindowServer/com.apple.WindowServer"],
        true,
    )?;
    runner.run(
        "/bin/bash",
        &["-c", "/usr/bin/chflags uchg /private/var/folders/*/*/*/WindowServer"],
        true,
    )?;
    Ok(())
}

pub const NOTIFICATION_CENTER_PREFS: &str =
    "Library/Containers/com.apple.notificationcenterui/Data/Library/Preferences/com.apple.notificationcenterui.plist";

/// RenderBox crashes the News widgets on Ivy Bridge and Haswell.
/// Returns how many widget instances were dropped.
pub fn remove_news_widgets(runner: &dyn PrivilegedRunner, os: &OsInfo, user_home: Option<&Path>, dry_run: bool) -> PatchResult<usize> {
    if os.major() < VENTURA {
        return Ok(0);
    }
    let Some(home) = user_home else {
        debug!("no user home, skipping widget cleanup");
        return Ok(0);
    };
    let path = home.join(NOTIFICATION_CENTER_PREFS);
    if !path.exists() {
        return Ok(0);
    }

    let mut prefs = Value::from_file(&path)?;
    let Some(instances) = prefs
        .as_dictionary_mut()
        .and_then(|dict| dict.get_mut("widgets"))
        .and_then(Value::as_dictionary_mut)
        .and_then(|widgets| widgets.get_mut("instances"))
        .and_then(Value::as_array_mut)
    else {
        return Ok(0);
    };
    let before = instances.len();
    instances.retain(|instance| !is_news_widget(instance));
    let removed = before - instances.len();
    if removed == 0 {
        return Ok(0);
    }

    info!("removing {} News widget(s)", removed);
    if !dry_run {
        prefs.to_file_binary(&path)?;
    }
    runner.run("/usr/bin/killall", &["NotificationCenter"], false)?;
    Ok(removed)
}

/// Each instance is an archived plist whose `widget` entry is itself archived.
fn is_news_widget(instance: &Value) -> bool {
    let Some(outer) = instance.as_data().and_then(parse_archived) else {
        return false;
    };
    let Some(entries) = outer.as_dictionary() else {
        return false;
    };
    entries
        .iter()
        .filter(|(key, _)| key.contains("widget"))
        .filter_map(|(_, value)| value.as_data().and_then(parse_archived))
        .any(|inner| {
            inner
                .as_dictionary()
                .and_then(|dict| dict.get("$objects"))
                .and_then(Value::as_array)
                .map(|objects| objects.iter().any(mentions_news))
                .unwrap_or(false)
        })
}

fn parse_archived(bytes: &[u8]) -> Option<Value> {
    Value::from_reader(Cursor::new(bytes)).ok()
}

fn mentions_news(object: &Value) -> bool {
    const NEWS: &str = "com.apple.news";
    match object {
        Value::String(text) => text.contains(NEWS),
        Value::Data(bytes) => bytes.windows(NEWS.len()).any(|window| window == NEWS.as_bytes()),
        _ => false,
    }
}

/// GPUCompiler versions the downgraded binary links against.
fn gpu_compiler_versions(os: &OsInfo) -> Option<(&'static str, &'static str)> {
    match os.major() {
        major if major < VENTURA => None,
        VENTURA if os.minor() < 4 => None,
        VENTURA => Some(("31001", "31001.669")),
        SONOMA if os.minor() < 2 => None,
        _ => Some(("32023", "32023.26")),
    }
}

/// The downgraded GPUCompiler hardcodes its clang library version; copy the
/// running OS's libraries under that name. Returns the merged source, if any.
pub fn patch_gpu_compiler_libraries(runner: &dyn PrivilegedRunner, os: &OsInfo, mount: &Path, dry_run: bool) -> PatchResult<Option<PathBuf>> {
    let Some((base, pinned)) = gpu_compiler_versions(os) else {
        return Ok(None);
    };
    let library_dir = mount
        .join("System/Library/PrivateFrameworks/GPUCompiler.framework/Versions")
        .join(base)
        .join("Libraries/lib/clang");
    let dest = library_dir.join(pinned);
    if !dest.exists() {
        if dry_run {
            return Ok(None);
        }
        return Err(PatchError::PreconditionMissing { path: dest });
    }

    let prefix = format!("{base}.");
    for entry in fs::read_dir(&library_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == pinned || !name.starts_with(&prefix) {
            continue;
        }
        if dest.join("lib").exists() {
            return Ok(None);
        }
        info!("merging GPUCompiler libraries {} into {}", name, pinned);
        let source = entry.path().join("lib");
        runner.root(
            "/bin/cp",
            &["-R", &source.to_string_lossy(), &format!("{}/", dest.display())],
        )?;
        return Ok(Some(source));
    }
    warn!("no GPUCompiler library to merge in {}", library_dir.display());
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::tests::{gpu, profile};
    use crate::runner::RecordingRunner;
    use phoenix_core::{Architecture, KernelVersion};

    #[test]
    fn best_board_follows_form_factor() {
        let intel = || gpu(0x8086, 0x0126, Architecture::IntelSandyBridge);
        let amd = || gpu(0x1002, 0x6760, Architecture::AmdTeraScale2);
        assert_eq!(best_sandy_board(&profile("MacBookPro11,3", vec![intel()])), "Mac-94245A3940C91C80");
        assert_eq!(best_sandy_board(&profile("MacBookPro5,2", vec![intel()])), "Mac-942459F5819B171B");
        assert_eq!(best_sandy_board(&profile("MacBookPro12,1", vec![intel()])), "Mac-94245B3640C91C81");
        assert_eq!(best_sandy_board(&profile("MacBookAir6,1", vec![intel()])), "Mac-C08A6BB70A942AC2");
        assert_eq!(best_sandy_board(&profile("MacBook7,1", vec![intel()])), "Mac-742912EFDBEE19B3");
        assert_eq!(best_sandy_board(&profile("iMac13,2", vec![intel(), amd()])), "Mac-942B59F58194171B");
        assert_eq!(best_sandy_board(&profile("Macmini6,2", vec![intel(), amd()])), "Mac-4BC72D62AD45599E");
        assert_eq!(best_sandy_board(&profile("Macmini6,2", vec![intel()])), "Mac-8ED6AF5B48C039E1");
    }

    #[test]
    fn framebuffer_accepts_reported_board() {
        let payloads = tempfile::tempdir().unwrap();
        let binary = payloads.path().join(SNB_FRAMEBUFFER);
        fs::create_dir_all(binary.parent().unwrap()).unwrap();
        fs::write(&binary, b"\x00\x01Mac-94245B3640C91C81\x00tail").unwrap();

        let mut host = profile("MacBookPro12,1", vec![gpu(0x8086, 0x0126, Architecture::IntelSandyBridge)]);
        host.reported_board_id = "Mac-E43C1C25D4880AD6".to_string();
        let replaced = patch_sandy_board_id(payloads.path(), &host, false).unwrap();
        assert_eq!(replaced, Some("Mac-94245B3640C91C81"));
        assert_eq!(fs::read(&binary).unwrap(), b"\x00\x01Mac-E43C1C25D4880AD6\x00tail".to_vec());
    }

    #[test]
    fn stock_board_is_left_alone() {
        let payloads = tempfile::tempdir().unwrap();
        let mut host = profile("Macmini5,1", vec![gpu(0x8086, 0x0116, Architecture::IntelSandyBridge)]);
        host.reported_board_id = "Mac-8ED6AF5B48C039E1".to_string();
        assert_eq!(patch_sandy_board_id(payloads.path(), &host, false).unwrap(), None);
    }

    #[test]
    fn longer_board_id_cannot_be_patched() {
        let payloads = tempfile::tempdir().unwrap();
        let mut host = profile("iMac13,1", vec![gpu(0x8086, 0x0126, Architecture::IntelSandyBridge)]);
        host.reported_board_id = "Mac-00BE6ED71E35EB86-extra".to_string();
        assert!(matches!(
            patch_sandy_board_id(payloads.path(), &host, false),
            Err(PatchError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn window_server_lock_is_ventura_only() {
        let runner = RecordingRunner::new();
        disable_window_server_caching(&runner, &OsInfo::new(KernelVersion::new(21, 6), "21G115", "12.5")).unwrap();
        assert!(runner.lines().is_empty());
        disable_window_server_caching(&runner, &OsInfo::new(KernelVersion::new(22, 1), "22C65", "13.1")).unwrap();
        assert_eq!(runner.lines().len(), 2);
        assert!(runner.calls().iter().all(|call| call.elevated));
    }

    fn archived(value: Value) -> Value {
        let mut bytes = Vec::new();
        value.to_writer_binary(&mut bytes).unwrap();
        Value::Data(bytes)
    }

    fn widget(bundle: &str) -> Value {
        let mut inner = plist::Dictionary::new();
        inner.insert(
            "$objects".to_string(),
            Value::Array(vec![
                Value::String("$null".to_string()),
                Value::String("ChronoWidget".to_string()),
                Value::Data(bundle.as_bytes().to_vec()),
            ]),
        );
        let mut outer = plist::Dictionary::new();
        outer.insert("widget".to_string(), archived(Value::Dictionary(inner)));
        archived(Value::Dictionary(outer))
    }

    #[test]
    fn news_widgets_are_dropped() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join(NOTIFICATION_CENTER_PREFS);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut widgets = plist::Dictionary::new();
        widgets.insert(
            "instances".to_string(),
            Value::Array(vec![
                widget("com.apple.news.widget"),
                widget("com.apple.weather.widget"),
            ]),
        );
        let mut prefs = plist::Dictionary::new();
        prefs.insert("widgets".to_string(), Value::Dictionary(widgets));
        Value::Dictionary(prefs).to_file_binary(&path).unwrap();

        let runner = RecordingRunner::new();
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        assert_eq!(remove_news_widgets(&runner, &os, Some(home.path()), false).unwrap(), 1);
        assert!(runner.ran("/usr/bin/killall NotificationCenter"));

        let saved = Value::from_file(&path).unwrap();
        let left = saved
            .as_dictionary()
            .and_then(|dict| dict.get("widgets"))
            .and_then(Value::as_dictionary)
            .and_then(|dict| dict.get("instances"))
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(left.len(), 1);
    }

    #[test]
    fn compiler_libraries_merge_into_pinned_version() {
        let mount = tempfile::tempdir().unwrap();
        let clang = mount
            .path()
            .join("System/Library/PrivateFrameworks/GPUCompiler.framework/Versions/31001/Libraries/lib/clang");
        fs::create_dir_all(clang.join("31001.669")).unwrap();
        fs::create_dir_all(clang.join("31001.717/lib")).unwrap();

        let runner = RecordingRunner::new();
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let merged = patch_gpu_compiler_libraries(&runner, &os, mount.path(), false).unwrap();
        assert_eq!(merged, Some(clang.join("31001.717/lib")));
        assert_eq!(
            runner.lines()[0],
            format!("/bin/cp -R {} {}/", clang.join("31001.717/lib").display(), clang.join("31001.669").display())
        );

        let early = OsInfo::new(KernelVersion::new(22, 3), "22D49", "13.2");
        assert_eq!(patch_gpu_compiler_libraries(&runner, &early, mount.path(), false).unwrap(), None);
    }
}
