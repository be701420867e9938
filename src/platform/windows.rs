/// Names skipped when backing up a Windows profile. 7-Zip matches these
/// recursively against every path component.
pub const EXCLUDES: &[&str] = &[
    "node_modules",
    "target",
    "NTUSER.DAT*",
    "ntuser.dat*",
    "AppData\\Local\\Temp",
    "AppData\\Local\\Packages",
    "AppData\\Local\\Microsoft\\Windows\\INetCache",
    "AppData\\Local\\Google\\Chrome\\User Data\\Default\\Cache",
    "AppData\\Local\\Mozilla\\Firefox\\Profiles",
    "AppData\\Local\\npm-cache",
    ".cargo",
    ".rustup",
    "OneDrive",
];
