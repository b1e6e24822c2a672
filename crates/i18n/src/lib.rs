use std::collections::{BTreeMap, HashMap};

use core_types::UiLanguage;

type Catalog = BTreeMap<&'static str, &'static str>;

#[derive(Debug, Clone)]
pub struct I18n {
    lang: UiLanguage,
    catalogs: HashMap<UiLanguage, Catalog>,
}

impl I18n {
    pub fn new(lang: UiLanguage) -> Self {
        Self {
            lang,
            catalogs: HashMap::from([
                (UiLanguage::En, en_map()),
                (UiLanguage::Es, es_map()),
                (UiLanguage::Fr, fr_map()),
                (UiLanguage::De, de_map()),
                (UiLanguage::Zh, zh_map()),
            ]),
        }
    }

    pub fn set_language(&mut self, lang: UiLanguage) {
        self.lang = lang;
    }

    pub fn language(&self) -> UiLanguage {
        self.lang
    }

    pub fn t<'a>(&'a self, key: &'a str) -> &'a str {
        self.lookup(self.lang, key)
            .or_else(|| self.lookup(UiLanguage::En, key))
            .unwrap_or(key)
    }

    fn lookup(&self, lang: UiLanguage, key: &str) -> Option<&'static str> {
        self.catalogs.get(&lang)?.get(key).copied()
    }
}

fn en_map() -> Catalog {
    BTreeMap::from([
        ("welcome", "Welcome to Siivi"),
        ("tagline", "Your Intelligent AI Companion"),
        (
            "description",
            "Ask questions, get intelligent responses, and explore endless possibilities with your personalized AI assistant!",
        ),
        ("cli.prompt", "You"),
        ("cli.assistant", "Siivi"),
        ("cli.thinking", "Thinking..."),
        ("cli.new_chat", "New chat"),
        ("cli.goodbye", "Goodbye!"),
        ("cli.help", "Type /new for a new chat, /quit to leave."),
        (
            "cli.error",
            "Sorry, I encountered an error. Please try again.",
        ),
        ("cli.no_keys", "No API keys configured for this provider."),
        ("cli.image_placeholder", "Image service unavailable, showing a placeholder."),
    ])
}

fn es_map() -> Catalog {
    BTreeMap::from([
        ("welcome", "Bienvenido a Siivi"),
        ("tagline", "Tu Compañero de IA Inteligente"),
        (
            "description",
            "¡Haz preguntas, obtén respuestas inteligentes y explora infinitas posibilidades con tu asistente de IA personalizado!",
        ),
        ("cli.prompt", "Tú"),
        ("cli.thinking", "Pensando..."),
        ("cli.new_chat", "Nuevo chat"),
        ("cli.goodbye", "¡Adiós!"),
        (
            "cli.error",
            "Lo siento, encontré un error. Por favor, inténtalo de nuevo.",
        ),
    ])
}

fn fr_map() -> Catalog {
    BTreeMap::from([
        ("welcome", "Bienvenue chez Siivi"),
        ("tagline", "Votre Compagnon IA Intelligent"),
        (
            "description",
            "Posez des questions, obtenez des réponses intelligentes et explorez des possibilités infinies avec votre assistant IA personnalisé !",
        ),
        ("cli.prompt", "Vous"),
        ("cli.thinking", "Réflexion..."),
        ("cli.new_chat", "Nouvelle discussion"),
        ("cli.goodbye", "Au revoir !"),
        (
            "cli.error",
            "Désolé, une erreur est survenue. Veuillez réessayer.",
        ),
    ])
}

fn de_map() -> Catalog {
    BTreeMap::from([
        ("welcome", "Willkommen bei Siivi"),
        ("tagline", "Ihr Intelligenter KI-Begleiter"),
        (
            "description",
            "Stellen Sie Fragen, erhalten Sie intelligente Antworten und erkunden Sie endlose Möglichkeiten mit Ihrem personalisierten KI-Assistenten!",
        ),
        ("cli.prompt", "Sie"),
        ("cli.thinking", "Denke nach..."),
        ("cli.new_chat", "Neuer Chat"),
        ("cli.goodbye", "Auf Wiedersehen!"),
        (
            "cli.error",
            "Entschuldigung, ein Fehler ist aufgetreten. Bitte versuchen Sie es erneut.",
        ),
    ])
}

fn zh_map() -> Catalog {
    BTreeMap::from([
        ("welcome", "欢迎使用 Siivi"),
        ("tagline", "您的智能AI伙伴"),
        (
            "description",
            "提出问题，获得智能回答，与您的个性化AI助手探索无限可能！",
        ),
        ("cli.prompt", "你"),
        ("cli.thinking", "思考中..."),
        ("cli.new_chat", "新对话"),
        ("cli.goodbye", "再见！"),
        ("cli.error", "抱歉，出现错误。请重试。"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_has_the_welcome_texts() {
        for lang in UiLanguage::ALL {
            let i18n = I18n::new(lang);
            for key in ["welcome", "tagline", "description"] {
                assert!(
                    i18n.lookup(lang, key).is_some(),
                    "{key} missing for {}",
                    lang.code()
                );
            }
        }
        assert_eq!(I18n::new(UiLanguage::Zh).t("tagline"), "您的智能AI伙伴");
    }

    #[test]
    fn falls_back_to_english_then_key() {
        let mut i18n = I18n::new(UiLanguage::De);
        assert_eq!(i18n.t("cli.assistant"), "Siivi");
        assert_eq!(i18n.t("not.exists"), "not.exists");

        i18n.set_language(UiLanguage::Fr);
        assert_eq!(i18n.language(), UiLanguage::Fr);
        assert_eq!(i18n.t("welcome"), "Bienvenue chez Siivi");
    }
}
