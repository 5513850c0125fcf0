use fluent::{FluentArgs, FluentResource};
use fluent_bundle::bundle::FluentBundle;
use include_dir::{Dir, include_dir};
use poise::serenity_prelude as serenity;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use unic_langid::LanguageIdentifier;

// The concurrent memoizer keeps bundles Send + Sync
type ConcurrentBundle = FluentBundle<FluentResource, intl_memoizer::concurrent::IntlLangMemoizer>;

static LOCALES_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/locales");

/// Locale used when a guild's or user's locale has no bundle or lacks a key.
pub const DEFAULT_LOCALE: &str = "ru";

#[derive(Debug, Deserialize)]
pub struct CommandLocale {
    pub name: Option<String>,
    pub desc: Option<String>,
    #[serde(default)]
    pub options: HashMap<String, OptionLocale>,
    #[serde(default)]
    pub subcommands: HashMap<String, CommandLocale>,
}

#[derive(Debug, Deserialize)]
pub struct OptionLocale {
    pub name: Option<String>,
    pub desc: Option<String>,
    #[serde(default)]
    pub choices: HashMap<String, String>,
}

pub struct LocalizationManager {
    bundles: HashMap<LanguageIdentifier, ConcurrentBundle>,
    command_locales: HashMap<LanguageIdentifier, HashMap<String, CommandLocale>>,
}

impl LocalizationManager {
    pub fn new() -> Self {
        let mut bundles = HashMap::new();
        let mut command_locales = HashMap::new();

        // Iterate over subdirectories in the embedded locales directory
        for entry in LOCALES_DIR.dirs() {
            let locale_name = entry.path().to_string_lossy();

            if let Ok(lang_id) = locale_name.parse::<LanguageIdentifier>() {
                let mut bundle = ConcurrentBundle::new_concurrent(vec![lang_id.clone()]);
                let mut commands = HashMap::new();

                // Load files in the locale directory
                for file in entry.files() {
                    let path = file.path();
                    let extension = path.extension().and_then(|e| e.to_str());
                    let file_name = path.file_name().and_then(|n| n.to_str());

                    if extension == Some("ftl") {
                        if let Some(content) = file.contents_utf8() {
                            match FluentResource::try_new(content.to_string()) {
                                Ok(resource) => {
                                    if let Err(errors) = bundle.add_resource(resource) {
                                        for err in errors {
                                            error!(
                                                "Error adding resource for {}: {:?}",
                                                locale_name, err
                                            );
                                        }
                                    }
                                }
                                Err((_, errors)) => {
                                    for err in errors {
                                        error!(
                                            "Error parsing resource for {}: {:?}",
                                            locale_name, err
                                        );
                                    }
                                }
                            }
                        }
                    } else if file_name == Some("commands.yaml")
                        || file_name == Some("commands.yml")
                    {
                        if let Some(content) = file.contents_utf8() {
                            match serde_yaml::from_str::<HashMap<String, CommandLocale>>(content) {
                                Ok(yaml_commands) => {
                                    commands.extend(yaml_commands);
                                }
                                Err(err) => {
                                    error!(
                                        "Error parsing commands.yaml for {}: {:?}",
                                        locale_name, err
                                    );
                                }
                            }
                        }
                    }
                }

                info!("Loaded embedded locale: {}", locale_name);
                bundles.insert(lang_id.clone(), bundle);
                command_locales.insert(lang_id, commands);
            }
        }

        Self {
            bundles,
            command_locales,
        }
    }

    /// Proxy for a guild's preferred locale, read from the cache.
    pub fn for_guild(self: &Arc<Self>, cache: &serenity::Cache, guild_id: serenity::GuildId) -> L10nProxy {
        let locale = cache
            .guild(guild_id)
            .map(|guild| guild.preferred_locale.to_string())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        self.get_proxy(&locale)
    }

    pub fn get_proxy(self: &Arc<Self>, locale: &str) -> L10nProxy {
        L10nProxy {
            manager: self.clone(),
            locale: locale.to_string(),
        }
    }

    /// Formats `key` in `locale`, falling back to the default locale and then
    /// to the key itself.
    pub fn translate(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        let fallback: Option<LanguageIdentifier> = DEFAULT_LOCALE.parse().ok();
        let requested = locale.parse::<LanguageIdentifier>().ok();

        [requested.as_ref(), fallback.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|lang_id| self.format(lang_id, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    fn format(
        &self,
        lang_id: &LanguageIdentifier,
        key: &str,
        args: Option<&FluentArgs>,
    ) -> Option<String> {
        let bundle = self.bundles.get(lang_id)?;
        let pattern = bundle.get_message(key)?.value()?;
        let mut errors = vec![];
        let formatted = bundle.format_pattern(pattern, args, &mut errors).into_owned();
        if !errors.is_empty() {
            error!("Errors formatting {} for {}: {:?}", key, lang_id, errors);
        }
        Some(formatted)
    }

    pub fn apply_translations<U, E>(&self, commands: &mut [poise::Command<U, E>]) {
        for (lang_id, locales) in &self.command_locales {
            let locale_str = lang_id.to_string();

            for cmd in commands.iter_mut() {
                self.apply_to_command(cmd, locales, &locale_str);
            }
        }
    }

    fn apply_to_command<U, E>(
        &self,
        cmd: &mut poise::Command<U, E>,
        locales: &HashMap<String, CommandLocale>,
        locale_str: &str,
    ) {
        if let Some(loc) = locales.get(cmd.name.as_ref()) {
            // Command name and description localizations
            if let Some(name) = &loc.name {
                cmd.name_localizations
                    .to_mut()
                    .push((locale_str.to_string().into(), name.clone().into()));
                // The base name is what Discord shows for locales without a translation
                if locale_str == "en-US" {
                    cmd.name = name.clone().into();
                }
            }
            if let Some(desc) = &loc.desc {
                cmd.description_localizations
                    .to_mut()
                    .push((locale_str.to_string().into(), desc.clone().into()));
                if locale_str == "en-US" {
                    cmd.description = Some(desc.clone().into());
                }
            }

            // Options (parameters)
            for param in cmd.parameters.iter_mut() {
                if let Some(opt_loc) = loc.options.get(param.name.as_ref()) {
                    if let Some(name) = &opt_loc.name {
                        param
                            .name_localizations
                            .to_mut()
                            .push((locale_str.to_string().into(), name.clone().into()));
                        if locale_str == "en-US" {
                            param.name = name.clone().into();
                        }
                    }
                    if let Some(desc) = &opt_loc.desc {
                        param
                            .description_localizations
                            .to_mut()
                            .push((locale_str.to_string().into(), desc.clone().into()));
                        if locale_str == "en-US" {
                            param.description = Some(desc.clone().into());
                        }
                    }

                    // Choices
                    for choice in param.choices.to_mut().iter_mut() {
                        if let Some(choice_name) = opt_loc.choices.get(choice.name.as_ref()) {
                            choice
                                .localizations
                                .to_mut()
                                .push((locale_str.to_string().into(), choice_name.clone().into()));
                            if locale_str == "en-US" {
                                choice.name = choice_name.clone().into();
                            }
                        }
                    }
                }
            }

            // Subcommands (recursive search within the current command's locale config)
            for subcommand in cmd.subcommands.iter_mut() {
                self.apply_to_command(subcommand, &loc.subcommands, locale_str);
            }
        }
    }
}

/// A proxy for translation that holds a reference to the manager and a specific locale
pub struct L10nProxy {
    pub manager: Arc<LocalizationManager>,
    pub locale: String,
}

impl L10nProxy {
    pub fn t(&self, key: &str, args: Option<&FluentArgs>) -> String {
        self.manager.translate(&self.locale, key, args)
    }

    pub fn minutes(&self, minutes: i64) -> String {
        let mut args = FluentArgs::new();
        args.set("minutes", minutes);
        self.t("unit-minutes", Some(&args))
    }
}

/// Helper trait to add localization to the Poise context
pub trait ContextL10nExt {
    /// The guild's locale, falling back to the invoking user's.
    fn l10n_guild(&self) -> L10nProxy;
    /// The invoking user's locale, falling back to the guild's.
    fn l10n_user(&self) -> L10nProxy;
}

impl ContextL10nExt for crate::Context<'_> {
    fn l10n_guild(&self) -> L10nProxy {
        let manager = self.data().l10n.clone();
        let locale = self
            .guild()
            .map(|guild| guild.preferred_locale.to_string())
            .or_else(|| self.locale().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        manager.get_proxy(&locale)
    }

    fn l10n_user(&self) -> L10nProxy {
        match self.locale() {
            Some(locale) => self.data().l10n.get_proxy(locale),
            None => self.l10n_guild(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Arc<LocalizationManager> {
        Arc::new(LocalizationManager::new())
    }

    #[test]
    fn test_embedded_locales_are_loaded() {
        let manager = manager();
        assert_ne!(
            manager.translate("ru", "antiraid-action-kick", None),
            "antiraid-action-kick"
        );
        assert_ne!(
            manager.translate("en-US", "antiraid-action-kick", None),
            "antiraid-action-kick"
        );
    }

    #[test]
    fn test_unknown_locale_falls_back_to_default() {
        let manager = manager();
        assert_eq!(
            manager.translate("pt-BR", "antiraid-action-ban", None),
            manager.translate(DEFAULT_LOCALE, "antiraid-action-ban", None)
        );
        assert_eq!(
            manager.translate("not a locale!", "antiraid-action-ban", None),
            manager.translate(DEFAULT_LOCALE, "antiraid-action-ban", None)
        );
    }

    #[test]
    fn test_missing_key_returns_key() {
        let manager = manager();
        assert_eq!(manager.translate("ru", "no-such-key", None), "no-such-key");
    }

    #[test]
    fn test_arguments_are_interpolated() {
        let proxy = manager().get_proxy("en-US");
        let text = proxy.minutes(15);
        assert!(text.contains("15"), "{}", text);
    }

    #[test]
    fn test_command_locales_apply_to_base_name() {
        let manager = manager();
        let mut commands = vec![crate::modules::anti_raid::commands::antiraid()];
        manager.apply_translations(&mut commands);

        assert!(
            commands[0]
                .description_localizations
                .iter()
                .any(|(locale, _)| locale == "ru")
        );
    }
}
