use anyhow::Result;
use libc::{getpwuid, uid_t};
use std::ffi::CStr;

/// Login name of the invoking user, looking through `sudo`.
pub fn current_user_name() -> Result<String> {
    if let Ok(user) = std::env::var("SUDO_USER") {
        if !user.is_empty() {
            return Ok(user);
        }
    }
    unsafe {
        let uid = libc::geteuid();
        let pwd = getpwuid(uid as uid_t);
        if pwd.is_null() {
            return Err(anyhow::anyhow!("failed to resolve current user"));
        }
        let name = CStr::from_ptr((*pwd).pw_name);
        Ok(name.to_string_lossy().into_owned())
    }
}
