//! Plugins and the scheme registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use channelfs_locator::{Locator, Options};

use crate::{Backend, ChannelError, Mode, Permissions};

/// Everything a plugin needs to open a medium.
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub options: &'a Options,
    pub mode: Mode,
    pub permissions: Permissions,
}

/// One scheme's way of opening a medium.
///
/// A plugin turns a locator payload into options, and options into a
/// [`Backend`]. It is shared by every channel opened through it and holds
/// no per-channel state.
pub trait Plugin: Send + Sync {
    /// The scheme this plugin serves, e.g. `"File"`.
    fn scheme(&self) -> &'static str;

    /// Access mode used when the caller gives none.
    fn default_mode(&self) -> Option<Mode> {
        None
    }

    /// Translate the payload of `Scheme://payload` into options.
    fn payload_options(&self, payload: &str) -> Result<Options, ChannelError>;

    /// Open the medium described by the request.
    fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError>;
}

/// A freshly opened backend together with its resolved mode.
pub struct Opened {
    pub scheme: &'static str,
    pub backend: Box<dyn Backend>,
    pub mode: Mode,
    pub permissions: Permissions,
}

impl fmt::Debug for Opened {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opened")
            .field("scheme", &self.scheme)
            .field("mode", &self.mode)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

/// Maps scheme names (case-insensitive) to plugins.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, returning the one it replaced.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .insert(plugin.scheme().to_ascii_lowercase(), Arc::new(plugin))
    }

    /// Builder-style [`Registry::register`].
    #[must_use]
    pub fn with<P: Plugin + 'static>(mut self, plugin: P) -> Self {
        self.register(plugin);
        self
    }

    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Registered schemes as the plugins spell them.
    pub fn schemes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.plugins.values().map(|p| p.scheme())
    }

    fn plugin(&self, scheme: &str) -> Result<Arc<dyn Plugin>, ChannelError> {
        self.get(scheme).ok_or_else(|| ChannelError::UnknownScheme {
            scheme: scheme.to_string(),
        })
    }

    /// Open `Scheme://payload [options]`.
    pub fn open_locator(
        &self,
        locator: &str,
        mode: Mode,
        permissions: Permissions,
    ) -> Result<Opened, ChannelError> {
        let locator = Locator::parse(locator)?;
        let plugin = self.plugin(locator.scheme())?;
        let (_, payload, extra) = locator.into_parts();

        let mut options = plugin.payload_options(&payload)?;
        options.extend(extra);

        Self::open_with(plugin.as_ref(), &options, mode, permissions)
    }

    /// Open from an option list whose `stream` option names the scheme.
    pub fn open_options(
        &self,
        options: &Options,
        mode: Mode,
        permissions: Permissions,
    ) -> Result<Opened, ChannelError> {
        let scheme = options
            .get("stream")
            .ok_or(ChannelError::MissingOption { option: "stream" })?;
        let plugin = self.plugin(scheme)?;
        Self::open_with(plugin.as_ref(), options, mode, permissions)
    }

    fn open_with(
        plugin: &dyn Plugin,
        options: &Options,
        mode: Mode,
        permissions: Permissions,
    ) -> Result<Opened, ChannelError> {
        let mode = if mode.is_defined() {
            mode
        } else {
            mode | plugin.default_mode().ok_or(ChannelError::UndefinedMode)?
        };
        mode.validate()?;

        let request = OpenRequest {
            options,
            mode,
            permissions,
        };
        let backend = plugin.open(&request)?;
        log::debug!("opened {} channel with mode {:?}", plugin.scheme(), mode);

        Ok(Opened {
            scheme: plugin.scheme(),
            backend,
            mode,
            permissions,
        })
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.schemes()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use crate::ErrorKind;

    struct Echo;

    impl Plugin for Echo {
        fn scheme(&self) -> &'static str {
            "Echo"
        }

        fn default_mode(&self) -> Option<Mode> {
            Some(Mode::READ_ONLY)
        }

        fn payload_options(&self, payload: &str) -> Result<Options, ChannelError> {
            let mut options = Options::new();
            options.push("name", payload);
            Ok(options)
        }

        fn open(&self, request: &OpenRequest<'_>) -> Result<Box<dyn Backend>, ChannelError> {
            let name = request
                .options
                .get("name")
                .ok_or(ChannelError::MissingOption { option: "name" })?;
            Ok(Box::new(ScriptedBackend::new(name.as_bytes(), true)))
        }
    }

    #[test]
    fn open_locator_works() {
        let registry = Registry::new().with(Echo);
        let mut opened = registry
            .open_locator("echo://hello", Mode::empty(), Permissions::empty())
            .unwrap();
        assert_eq!(opened.scheme, "Echo");
        assert_eq!(opened.mode, Mode::READ_ONLY);

        let mut buf = [0u8; 5];
        assert_eq!(opened.backend.read(&mut buf).unwrap().bytes, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn default_mode_merges_with_flags() {
        let registry = Registry::new().with(Echo);
        let opened = registry
            .open_locator("Echo://x", Mode::NOT_CLOSE, Permissions::empty())
            .unwrap();
        assert_eq!(opened.mode, Mode::READ_ONLY | Mode::NOT_CLOSE);
    }

    #[test]
    fn open_options_needs_stream() {
        let registry = Registry::new().with(Echo);
        let options = Options::parse("name=abc").unwrap();
        let err = registry
            .open_options(&options, Mode::READ_ONLY, Permissions::empty())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingOption);

        let options = Options::parse("stream=ECHO name=abc").unwrap();
        assert!(registry
            .open_options(&options, Mode::READ_ONLY, Permissions::empty())
            .is_ok());
    }

    #[test]
    fn unknown_scheme_fails() {
        let registry = Registry::new().with(Echo);
        let err = registry
            .open_locator("Nope://x", Mode::READ_ONLY, Permissions::empty())
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownScheme { .. }));
    }

    #[test]
    fn bad_mode_fails_before_open() {
        let registry = Registry::new().with(Echo);
        let err = registry
            .open_locator(
                "Echo://x",
                Mode::READ_ONLY | Mode::WRITE_ONLY,
                Permissions::empty(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Mode);
    }

    #[test]
    fn register_replaces_and_lists() {
        let mut registry = Registry::new();
        assert!(registry.register(Echo).is_none());
        assert!(registry.register(Echo).is_some());
        assert_eq!(registry.schemes().collect::<Vec<_>>(), vec!["Echo"]);
        assert_eq!(format!("{:?}", registry), "[\"Echo\"]");
    }
}
