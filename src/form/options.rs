use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::validation::SchemaAdapter;

/// When user interaction (`change` / `blur`) validates a field before the
/// first submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    OnSubmit,
    OnBlur,
    OnChange,
    /// First on blur, then on every change once the field was touched.
    OnTouched,
    All,
}

/// When user interaction re-validates a field after a submit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidateMode {
    #[default]
    OnChange,
    OnBlur,
    OnSubmit,
}

#[derive(Clone, Default)]
pub struct FormOptions {
    pub mode: ValidationMode,
    pub revalidate_mode: RevalidateMode,
    /// Perform an implicit reset once a submit succeeded.
    pub reset_on_submit_success: bool,
    /// Drop a field's value from the tree when it is unregistered.
    pub should_unregister: bool,
    pub(crate) resolver: Option<Arc<dyn SchemaAdapter>>,
}

impl fmt::Debug for FormOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormOptions")
            .field("mode", &self.mode)
            .field("revalidate_mode", &self.revalidate_mode)
            .field("reset_on_submit_success", &self.reset_on_submit_success)
            .field("should_unregister", &self.should_unregister)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

impl FormOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ValidationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_revalidate_mode(mut self, mode: RevalidateMode) -> Self {
        self.revalidate_mode = mode;
        self
    }

    pub fn with_reset_on_submit_success(mut self, enabled: bool) -> Self {
        self.reset_on_submit_success = enabled;
        self
    }

    pub fn with_should_unregister(mut self, enabled: bool) -> Self {
        self.should_unregister = enabled;
        self
    }

    /// Replaces every field's rule chain with a schema adapter.
    pub fn with_resolver(mut self, resolver: impl SchemaAdapter + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_shared_resolver(mut self, resolver: Arc<dyn SchemaAdapter>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    pub(crate) fn validates_on_change(&self, submitted: bool, touched: bool) -> bool {
        if submitted {
            return self.revalidate_mode == RevalidateMode::OnChange;
        }
        match self.mode {
            ValidationMode::OnChange | ValidationMode::All => true,
            ValidationMode::OnTouched => touched,
            ValidationMode::OnSubmit | ValidationMode::OnBlur => false,
        }
    }

    pub(crate) fn validates_on_blur(&self, submitted: bool) -> bool {
        if submitted {
            return self.revalidate_mode == RevalidateMode::OnBlur;
        }
        matches!(
            self.mode,
            ValidationMode::OnBlur | ValidationMode::OnTouched | ValidationMode::All
        )
    }
}

/// Flags for [`crate::FormEngine::set_value`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetValueOptions {
    pub validate: bool,
    pub mark_dirty: bool,
    pub mark_touched: bool,
}

impl SetValueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, dirty and touch: what a user edit does.
    pub fn all() -> Self {
        Self {
            validate: true,
            mark_dirty: true,
            mark_touched: true,
        }
    }

    pub fn validate(mut self) -> Self {
        self.validate = true;
        self
    }

    pub fn dirty(mut self) -> Self {
        self.mark_dirty = true;
        self
    }

    pub fn touch(mut self) -> Self {
        self.mark_touched = true;
        self
    }
}

/// What a reset keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOptions {
    pub keep_errors: bool,
    pub keep_touched: bool,
    pub keep_is_submitted: bool,
    /// Explicit reset values do not replace the committed defaults.
    pub keep_default_values: bool,
}

impl ResetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep_errors(mut self) -> Self {
        self.keep_errors = true;
        self
    }

    pub fn keep_touched(mut self) -> Self {
        self.keep_touched = true;
        self
    }

    pub fn keep_is_submitted(mut self) -> Self {
        self.keep_is_submitted = true;
        self
    }

    pub fn keep_default_values(mut self) -> Self {
        self.keep_default_values = true;
        self
    }
}
