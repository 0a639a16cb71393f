/// Component kinds declared under `<application>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Activity,
    Service,
    Receiver,
    Provider,
}

impl ComponentKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "activity" => Some(Self::Activity),
            "service" => Some(Self::Service),
            "receiver" => Some(Self::Receiver),
            "provider" => Some(Self::Provider),
            _ => None,
        }
    }
}

/// Expands a component name relative to the manifest package:
/// `.Foo` and `Foo` both become `<package>.Foo`, qualified names are kept.
pub fn resolve_name(package: Option<&str>, name: &str) -> String {
    match package {
        Some(package) if name.starts_with('.') => format!("{package}{name}"),
        Some(package) if !name.contains('.') => format!("{package}.{name}"),
        _ => name.to_string(),
    }
}
