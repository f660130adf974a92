//! Site category taxonomy

use serde::Serialize;

/// Category for products that fit nowhere else
pub const FALLBACK_CATEGORY: &str = "其他类型";

/// Category display metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
}

/// The fixed site taxonomy, in display order
pub const SITE_CATEGORIES: &[CategoryInfo] = &[
    CategoryInfo { name: "通用助手", label: "通用助手", icon: "🤖" },
    CategoryInfo { name: "图像生成", label: "图像生成", icon: "🎨" },
    CategoryInfo { name: "视频创作", label: "视频创作", icon: "🎬" },
    CategoryInfo { name: "音频处理", label: "音频处理", icon: "🎵" },
    CategoryInfo { name: "编程开发", label: "编程开发", icon: "💻" },
    CategoryInfo { name: "智能搜索", label: "智能搜索", icon: "🔍" },
    CategoryInfo { name: "知识管理", label: "知识管理", icon: "📚" },
    CategoryInfo { name: "写作辅助", label: "写作辅助", icon: "✍️" },
    CategoryInfo { name: "智能硬件", label: "智能硬件", icon: "🔧" },
    CategoryInfo { name: "虚拟陪伴", label: "虚拟陪伴", icon: "💬" },
    CategoryInfo { name: "Agent构建", label: "Agent 构建", icon: "🛠️" },
    CategoryInfo { name: "效率工具", label: "效率工具", icon: "⚡" },
    CategoryInfo { name: "3D生成", label: "3D 生成", icon: "🎮" },
    CategoryInfo { name: "科研辅助", label: "科研辅助", icon: "🔬" },
    CategoryInfo { name: FALLBACK_CATEGORY, label: FALLBACK_CATEGORY, icon: "📁" },
];

const LEGACY_CATEGORIES: &[(&str, &str)] = &[
    ("文本", "写作辅助"),
    ("图像", "图像生成"),
    ("视频", "视频创作"),
    ("音频", "音频处理"),
    ("代码", "编程开发"),
    ("数据", "效率工具"),
    ("设计", "图像生成"),
    ("效率", "效率工具"),
    ("综合", "通用助手"),
    ("AI助手", "通用助手"),
    ("聊天", "通用助手"),
    ("搜索", "智能搜索"),
    ("知识", "知识管理"),
    ("学习", "知识管理"),
    ("写作", "写作辅助"),
    ("硬件", "智能硬件"),
    ("陪伴", "虚拟陪伴"),
    ("Agent", "Agent构建"),
    ("3D", "3D生成"),
    ("科研", "科研辅助"),
];

/// Metadata for a taxonomy category
pub fn category_info(name: &str) -> Option<&'static CategoryInfo> {
    SITE_CATEGORIES.iter().find(|c| c.name == name)
}

/// Taxonomy category a legacy value maps to
pub fn legacy_category(value: &str) -> Option<&'static str> {
    LEGACY_CATEGORIES
        .iter()
        .find(|(legacy, _)| *legacy == value)
        .map(|(_, current)| *current)
}

/// Map any stored or model-produced value onto the taxonomy.
///
/// Taxonomy values pass through, legacy values are mapped, everything else
/// (including empty) becomes [`FALLBACK_CATEGORY`].
pub fn normalize_category(value: Option<&str>) -> &'static str {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return FALLBACK_CATEGORY;
    };

    category_info(value)
        .map(|c| c.name)
        .or_else(|| legacy_category(value))
        .unwrap_or(FALLBACK_CATEGORY)
}
