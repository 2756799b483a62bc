//! Static extension/mimetype tables and the filename policy.
//!
//! Extensions are handled lowercase and without the leading dot.

/// Right-to-left override (U+202E), used to make `evil<RLO>fdp.exe` read as `evilexe.pdf`.
pub const FORBIDDEN_FILENAME_CHAR: char = '\u{202E}';

/// Files that operating systems drop on removable media on their own.
pub const OS_METADATA_FILES: &[&str] = &[
    ".Trashes",
    "._.Trashes",
    ".DS_Store",
    ".fseventsd",
    ".Spotlight-V100",
];

/// Mimetypes whose images carry EXIF or PNG text metadata.
pub const METADATA_MIMETYPES: &[&str] = &["image/jpeg", "image/tiff", "image/png"];

/// Extensions whose guessed mimetype does not match what the sniffer
/// reports for legitimate files. Consulted before the general guesser.
const OVERRIDE_EXTENSIONS: &[(&str, &[&str])] = &[
    ("gz", &["application/gzip", "application/x-gzip"]),
    ("tgz", &["application/gzip", "application/x-gzip"]),
    ("csv", &["text/csv", "text/plain"]),
    ("md", &["text/markdown", "text/plain"]),
    ("markdown", &["text/markdown", "text/plain"]),
    ("json", &["application/json", "text/plain"]),
    ("yaml", &["application/yaml", "text/plain"]),
    ("yml", &["application/yaml", "text/plain"]),
    ("toml", &["application/toml", "text/plain"]),
    ("log", &["text/plain"]),
    ("rtf", &["application/rtf", "text/rtf"]),
    ("exe", &["application/x-dosexec"]),
    ("dll", &["application/x-dosexec"]),
    ("numbers", &["application/vnd.apple.numbers", "application/zip"]),
    ("pages", &["application/vnd.apple.pages", "application/zip"]),
    ("keynote", &["application/vnd.apple.keynote", "application/zip"]),
];

/// Groups of mimetypes that name the same content.
const MIMETYPE_ALIASES: &[&[&str]] = &[
    &["application/x-dosexec", "application/x-msdos-program"],
    &["application/rtf", "text/rtf"],
    &[
        "application/rar",
        "application/x-rar",
        "application/vnd.rar",
        "application/x-rar-compressed",
    ],
    &["application/ogg", "audio/ogg"],
    &["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"],
    &["application/gzip", "application/x-gzip"],
    &["text/xml", "application/xml"],
];

// Sources: howtogeek's list of dangerous Windows extensions, the limewire
// filter settings and Chrome's dangerous download list.
const MALICIOUS_EXTENSIONS: &[&str] = &[
    "exe", "pif", "application", "gadget", "msi", "msp", "com", "scr", "hta", "cpl", "msc",
    "jar", "bat", "cmd", "vb", "vbs", "vbe", "js", "jse", "ws", "wsf", "wsc", "wsh", "ps1",
    "ps1xml", "ps2", "ps2xml", "psc1", "psc2", "msh", "msh1", "msh2", "mshxml", "msh1xml",
    "msh2xml", "scf", "lnk", "inf", "reg", "dll", "docm", "dotm", "xlsm", "xltm", "xlam",
    "pptm", "potm", "ppam", "ppsm", "sldm", "asf", "asx", "au", "htm", "html", "mht", "wax",
    "wm", "wma", "wmd", "wmv", "wmx", "wmz", "wvx", "ad", "ade", "adp", "ah", "apk", "app",
    "asp", "bas", "bash", "cfg", "chi", "chm", "class", "command", "crt", "crx", "csh", "deb",
    "dex", "drv", "fxp", "grp", "hlp", "htt", "ini", "ins", "isp", "jnlp", "ksh", "local",
    "mad", "maf", "mag", "mam", "manifest", "maq", "mar", "mas", "mat", "mau", "mav", "maw",
    "mda", "mdb", "mde", "mdt", "mdw", "mdz", "mhtml", "mmc", "mof", "mst", "ocx", "ops",
    "pcd", "pkg", "pl", "plg", "prf", "prg", "pst", "py", "pyc", "pyw", "rb", "rpm", "sct",
    "sh", "shar", "shb", "shs", "shtm", "shtml", "spl", "svg", "swf", "sys", "tcsh", "url",
    "vsd", "vsmacros", "vss", "vst", "vsw", "xbap", "xht", "xhtm", "xhtml", "xml", "xsl",
    "xslt", "website", "xnk", "appref-ms", "efi", "fon", "partial", "xrm_ms", "action", "bin",
    "inx", "ipa", "isu", "job", "out", "pad", "paf", "rgs", "u3p", "vbscript", "workflow",
    "001", "ace", "arc", "arj", "b64", "balz", "bhx", "cab", "cpio", "fat", "hfs", "hqx",
    "iso", "lha", "lpaq1", "lpaq5", "lpaq8", "lzh", "mim", "ntfs", "paq8f", "paq8jd", "paq8l",
    "paq8o", "pea", "quad", "r00", "r01", "r02", "r03", "r04", "r05", "r06", "r07", "r08",
    "r09", "r10", "r11", "r12", "r13", "r14", "r15", "r16", "r17", "r18", "r19", "r20", "r21",
    "r22", "r23", "r24", "r25", "r26", "r27", "r28", "r29", "squashfs", "swm", "tpz", "txz",
    "tz", "udf", "uu", "uue", "vhd", "vmdk", "wim", "wrc", "xar", "xxe", "z", "zipx", "zpaq",
    "cdr", "dart", "dc42", "diskcopy42", "dmg", "dmgpart", "dvdr", "img", "imgpart", "ndif",
    "smi", "sparsebundle", "sparseimage", "toast", "udif",
];

pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

fn override_for(ext: &str) -> Option<&'static [&'static str]> {
    OVERRIDE_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mimes)| *mimes)
}

/// All mimetypes considered equivalent to `mimetype`, itself included.
pub fn aliases_of(mimetype: &str) -> Vec<String> {
    let mut out = vec![mimetype.to_string()];
    for group in MIMETYPE_ALIASES {
        if group.contains(&mimetype) {
            for alias in group.iter() {
                push_unique(&mut out, alias);
            }
        }
    }
    out
}

/// Whether the extension is known to the override table or the guesser.
pub fn is_known_extension(ext: &str) -> bool {
    let ext = normalize_extension(ext);
    override_for(&ext).is_some() || mime_guess::from_ext(&ext).first_raw().is_some()
}

pub fn expected_mimetypes_for(ext: &str) -> Vec<String> {
    let ext = normalize_extension(ext);
    let direct: Vec<String> = match override_for(&ext) {
        Some(mimes) => mimes.iter().map(|m| m.to_string()).collect(),
        None => mime_guess::from_ext(&ext)
            .iter_raw()
            .map(|m| m.to_string())
            .collect(),
    };
    let mut out = Vec::new();
    for mime in direct {
        for alias in aliases_of(&mime) {
            push_unique(&mut out, &alias);
        }
    }
    out
}

pub fn expected_extensions_for(mimetype: &str) -> Vec<String> {
    let mut out = Vec::new();
    for mime in aliases_of(&mimetype.to_lowercase()) {
        if let Some(exts) = mime_guess::get_mime_extensions_str(&mime) {
            for ext in exts {
                push_unique(&mut out, ext);
            }
        }
        for (ext, mimes) in OVERRIDE_EXTENSIONS {
            if mimes.contains(&mime.as_str()) {
                push_unique(&mut out, ext);
            }
        }
    }
    out
}

pub fn is_malicious_extension(ext: &str) -> bool {
    let ext = normalize_extension(ext);
    MALICIOUS_EXTENSIONS.contains(&ext.as_str())
}

pub fn is_os_metadata_file(filename: &str) -> bool {
    OS_METADATA_FILES.contains(&filename)
}

pub fn has_forbidden_char(filename: &str) -> bool {
    filename.contains(FORBIDDEN_FILENAME_CHAR)
}

pub fn strip_forbidden_chars(filename: &str) -> String {
    filename.replace(FORBIDDEN_FILENAME_CHAR, "")
}

/// Pairs of (extension, mimetype) held in the static override table.
pub fn override_entries() -> impl Iterator<Item = (&'static str, &'static str)> {
    OVERRIDE_EXTENSIONS
        .iter()
        .flat_map(|(ext, mimes)| mimes.iter().map(move |m| (*ext, *m)))
}

fn push_unique(out: &mut Vec<String>, value: &str) {
    if !out.iter().any(|v| v == value) {
        out.push(value.to_string());
    }
}
