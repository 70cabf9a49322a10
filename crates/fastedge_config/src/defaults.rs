// Various default functions to be used by serde

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_launch_version() -> String {
    "0.2.0".into()
}
