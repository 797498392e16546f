//! Registry of the classes and members the patch targets

use std::collections::HashSet;
use std::sync::OnceLock;

/// Name of the method that receives the timeout prologue.
pub const TARGET_METHOD: &str = "connect";

pub const CONNECT_TIMEOUT_GETTER: &str = "getConnectTimeout";
pub const CONNECT_TIMEOUT_SETTER: &str = "setConnectTimeout";
pub const READ_TIMEOUT_GETTER: &str = "getReadTimeout";
pub const READ_TIMEOUT_SETTER: &str = "setReadTimeout";

pub const TIMEOUT_GETTER_DESCRIPTOR: &str = "()I";
pub const TIMEOUT_SETTER_DESCRIPTOR: &str = "(I)V";

/// Internal names of the classes whose `connect` gets patched
static TARGET_CLASSES: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn init_target_classes() -> HashSet<&'static str> {
    // The two JDK classes that implement connect() for http and https.
    // Subtypes inherit the patched behavior through them and are left
    // untouched on purpose; adding names here widens the patch surface.
    let mut set = HashSet::new();
    set.insert("sun/net/www/protocol/http/HttpURLConnection");
    set.insert("sun/net/www/protocol/https/AbstractDelegateHttpsURLConnection");
    set
}

/// Get the target class set, initializing it if necessary
pub fn target_classes() -> &'static HashSet<&'static str> {
    TARGET_CLASSES.get_or_init(init_target_classes)
}

/// Exact, case-sensitive membership test on the internal name. No
/// hierarchy walk and no package patterns; anything else passes through.
pub fn is_target(internal_name: &str) -> bool {
    target_classes().contains(internal_name)
}
