/// When a field is left out of the generic map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignore {
    /// Always part of the wire form.
    Never,
    /// Internal field, never part of the wire form.
    Always,
    /// Left out while the named boolean field is `true`.
    When(&'static str),
}

/// Per-field metadata consulted by the generic map conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Property name on the wire.
    pub name: &'static str,
    /// Declared type, for diagnostics.
    pub kind: &'static str,
    /// Exclusion policy.
    pub ignore: Ignore,
    /// Leave empty strings and lists out of the generic map.
    pub omit_empty: bool,
    /// Local write-through publishes a change notification.
    pub emit: bool,
}

impl FieldSpec {
    /// A plain field, always exported.
    pub const fn new(name: &'static str, kind: &'static str) -> Self {
        Self {
            name,
            kind,
            ignore: Ignore::Never,
            omit_empty: false,
            emit: false,
        }
    }

    /// Marks the field internal.
    pub const fn ignore(self) -> Self {
        Self {
            ignore: Ignore::Always,
            ..self
        }
    }

    /// Excludes the field while the boolean field `flag` is set.
    pub const fn ignore_when(self, flag: &'static str) -> Self {
        Self {
            ignore: Ignore::When(flag),
            ..self
        }
    }

    /// Leaves empty values out of the generic map.
    pub const fn omit_empty(self) -> Self {
        Self {
            omit_empty: true,
            ..self
        }
    }

    /// Publishes local writes of this field to the property watcher.
    pub const fn emit(self) -> Self {
        Self { emit: true, ..self }
    }

    /// Whether the field is local state only.
    pub fn is_internal(&self) -> bool {
        self.ignore == Ignore::Always
    }
}
