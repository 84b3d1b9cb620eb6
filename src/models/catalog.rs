/// Display metadata for a selectable remote model. The client only uses this
/// for labels; the id is passed through to the endpoint unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub description: Option<String>,
    pub context_length: u32,
    pub input_price: f64,
    pub output_price: f64,
}

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    provider: &'static str,
    description: &'static str,
}

const FREE_TIER_CONTEXT: u32 = 32_000;

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        id: "microsoft/mai-ds-r1:free",
        name: "Microsoft MAI-DS-r1",
        provider: "Microsoft",
        description: "Latest Microsoft research model (free tier)",
    },
    CatalogEntry {
        id: "qwen/qwen2.5-vl-32b-instruct:free",
        name: "Qwen 2.5 VL 32B",
        provider: "Qwen",
        description: "Visual language model with strong instruction following",
    },
    CatalogEntry {
        id: "deepseek/deepseek-chat-v3-0324:free",
        name: "DeepSeek Chat V3",
        provider: "DeepSeek",
        description: "Latest version of DeepSeek's chat model",
    },
    CatalogEntry {
        id: "featherless/qwerky-72b:free",
        name: "Qwerky 72B",
        provider: "Featherless",
        description: "Large-scale model with unique capabilities",
    },
    CatalogEntry {
        id: "mistralai/mistral-small-3.1-24b-instruct:free",
        name: "Mistral Small 3.1",
        provider: "Mistral",
        description: "Efficient instruction-following model from Mistral AI",
    },
    CatalogEntry {
        id: "deepseek/deepseek-r1:free",
        name: "DeepSeek R1",
        provider: "DeepSeek",
        description: "Advanced reasoning and analysis model",
    },
    CatalogEntry {
        id: "deepseek/deepseek-r1-zero:free",
        name: "DeepSeek R1 Zero",
        provider: "DeepSeek",
        description: "Specialized reasoning model from DeepSeek",
    },
    CatalogEntry {
        id: "qwen/qwq-32b:free",
        name: "QWQ 32B",
        provider: "Qwen",
        description: "Advanced language model from Qwen",
    },
    CatalogEntry {
        id: "thudm/glm-4-32b:free",
        name: "GLM-4 32B",
        provider: "THUDM",
        description: "Advanced multilingual model with strong reasoning capabilities",
    },
    CatalogEntry {
        id: "agentica-org/deepcoder-14b-preview:free",
        name: "DeepCoder 14B",
        provider: "Agentica",
        description: "Specialized model for code generation and analysis",
    },
    CatalogEntry {
        id: "nvidia/llama-3.3-nemotron-super-49b-v1:free",
        name: "Nemotron Super 49B",
        provider: "NVIDIA",
        description: "NVIDIA's powerful large language model",
    },
    CatalogEntry {
        id: "nvidia/llama-3.1-nemotron-nano-8b-v1:free",
        name: "Nemotron Nano 8B",
        provider: "NVIDIA",
        description: "Efficient and compact NVIDIA model",
    },
    CatalogEntry {
        id: "nvidia/llama-3.1-nemotron-ultra-253b-v1:free",
        name: "Nemotron Ultra 253B",
        provider: "NVIDIA",
        description: "NVIDIA's ultra-scale language model",
    },
    CatalogEntry {
        id: "meta-llama/llama-4-maverick:free",
        name: "Llama 4 Maverick",
        provider: "Meta",
        description: "Meta's advanced Llama 4 model variant",
    },
    CatalogEntry {
        id: "meta-llama/llama-4-scout:free",
        name: "Llama 4 Scout",
        provider: "Meta",
        description: "Efficient and fast Llama 4 model",
    },
    CatalogEntry {
        id: "deepseek/deepseek-v3-base:free",
        name: "DeepSeek V3",
        provider: "DeepSeek",
        description: "Versatile base model for general tasks",
    },
    CatalogEntry {
        id: "huggingfaceh4/zephyr-7b-beta:free",
        name: "Zephyr 7B Beta",
        provider: "HuggingFace",
        description: "Compact instruction-tuned chat model",
    },
];

impl CatalogEntry {
    fn to_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            provider: self.provider.to_string(),
            description: Some(self.description.to_string()),
            context_length: FREE_TIER_CONTEXT,
            input_price: 0.0,
            output_price: 0.0,
        }
    }
}

pub fn default_models() -> Vec<ModelInfo> {
    CATALOG.iter().map(CatalogEntry::to_info).collect()
}

pub fn find_model(id: &str) -> Option<ModelInfo> {
    CATALOG.iter().find(|e| e.id == id).map(CatalogEntry::to_info)
}

/// Human-readable name for a model id, falling back to the id itself for
/// models outside the built-in catalog.
pub fn display_name(id: &str) -> String {
    if id.is_empty() {
        return "No Model Selected".to_string();
    }
    CATALOG
        .iter()
        .find(|e| e.id == id)
        .map(|e| e.name.to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Appends remotely discovered models that the built-in catalog lacks,
/// keeping catalog order first.
pub fn merge_remote(mut models: Vec<ModelInfo>, remote: Vec<ModelInfo>) -> Vec<ModelInfo> {
    for model in remote {
        if !models.iter().any(|m| m.id == model.id) {
            models.push(model);
        }
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let models = default_models();
        assert_eq!(models.len(), 17);
        let mut ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), models.len());
        assert!(models.iter().all(|m| m.context_length == 32_000));
    }

    #[test]
    fn default_model_is_in_catalog() {
        let info = find_model(crate::config::DEFAULT_MODEL).unwrap();
        assert_eq!(info.name, "Microsoft MAI-DS-r1");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(display_name("qwen/qwq-32b:free"), "QWQ 32B");
        assert_eq!(display_name("vendor/custom"), "vendor/custom");
        assert_eq!(display_name(""), "No Model Selected");
    }

    #[test]
    fn merge_keeps_catalog_first_and_skips_duplicates() {
        let remote = vec![
            find_model("qwen/qwq-32b:free").unwrap(),
            ModelInfo {
                id: "openai/gpt-4o".into(),
                name: "GPT-4o".into(),
                provider: "openai".into(),
                description: None,
                context_length: 128_000,
                input_price: 0.0,
                output_price: 0.0,
            },
        ];
        let merged = merge_remote(default_models(), remote);
        assert_eq!(merged.len(), 18);
        assert_eq!(merged.last().unwrap().id, "openai/gpt-4o");
    }
}
