//! Current-module context used as the default scope for module-owned data.

use std::sync::RwLock;

pub const DEFAULT_MODULE: &str = "system";

#[derive(Debug)]
pub struct ModuleContext {
    current: RwLock<String>,
}

impl ModuleContext {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(module.into()),
        }
    }

    pub fn current(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_current(&self, module: impl Into<String>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = module.into();
    }

    /// `module` when given, otherwise the current module.
    pub fn resolve(&self, module: Option<&str>) -> String {
        match module {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => self.current(),
        }
    }
}

impl Default for ModuleContext {
    fn default() -> Self {
        Self::new(DEFAULT_MODULE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_falls_back_to_current_module() {
        let ctx = ModuleContext::default();
        assert_eq!(ctx.resolve(None), "system");
        assert_eq!(ctx.resolve(Some("")), "system");
        ctx.set_current("article");
        assert_eq!(ctx.resolve(None), "article");
        assert_eq!(ctx.resolve(Some("user")), "user");
    }
}
