//! 覆盖链查找
//!
//! 设置项、静态资源、模板、翻译都按同一规则查找：先查当前模块，
//! 未命中则沿 `floor` 逐级向下，直到命中或链耗尽。设置项在链耗尽后
//! 还会查询全局默认配置。
//!
//! 资源与模板查找会检查规范化后的路径是否仍位于模块的 `view/` 目录内，
//! 翻译文件同样限制在 `i18n/` 目录内，越界（例如 `../`）视为未找到。

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::record::{bare_setting_key, setting_key, Module};
use super::registry::ModuleRegistry;
use crate::core::ConfigProvider;
use crate::utils::{generate_uuid, CoreError, Result};

/// 空模板名
pub const EMPTY_TEMPLATE: &str = "empty.html";

/// 菜单描述文件（相对 `view/`）
pub const MENU_FILE: &str = "install/menu.json";

/// 翻译文件扩展名
pub const LANG_EXT: &str = "lang";

/// 翻译文件中的包含指令
pub const INCLUDE_DIRECTIVE: &str = "@include";

/// 默认语言设置项
pub const DEFAULT_LOCALE_SETTING: &str = "default.locale";

// ============================================================================
// 渲染上下文
// ============================================================================

/// 渲染上下文
///
/// 记录当前正在服务请求的模块。模板查找回落到 floor 时会更新 `current`。
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// 请求 ID
    pub request_id: String,

    /// 当前服务模块
    pub current: Arc<Module>,
}

impl RenderContext {
    /// 以指定模块为起点创建上下文
    pub fn new(module: Arc<Module>) -> Self {
        Self {
            request_id: generate_uuid(),
            current: module,
        }
    }
}

/// 模板查找结果
#[derive(Debug, Clone)]
pub enum TemplateRef {
    /// 找到模板：所属模块与文件路径
    Found {
        module: Arc<Module>,
        path: PathBuf,
    },
    /// 使用空模板
    Empty,
}

impl TemplateRef {
    /// 模板文件路径；空模板返回 `None`
    pub fn path(&self) -> Option<&Path> {
        match self {
            TemplateRef::Found { path, .. } => Some(path),
            TemplateRef::Empty => None,
        }
    }

    /// 所属模块
    pub fn module(&self) -> Option<&Arc<Module>> {
        match self {
            TemplateRef::Found { module, .. } => Some(module),
            TemplateRef::Empty => None,
        }
    }
}

/// 资源查找结果
#[derive(Debug, Clone)]
pub struct ResourceRef {
    /// 提供资源的模块
    pub module: Arc<Module>,

    /// 规范化后的文件路径
    pub path: PathBuf,
}

// ============================================================================
// 覆盖链
// ============================================================================

/// 覆盖链
#[derive(Clone)]
pub struct OverrideChain {
    registry: Arc<ModuleRegistry>,
    defaults: Arc<dyn ConfigProvider>,
}

impl OverrideChain {
    /// 创建覆盖链
    pub fn new(registry: Arc<ModuleRegistry>, defaults: Arc<dyn ConfigProvider>) -> Self {
        Self { registry, defaults }
    }

    /// 模块注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 从 `start` 开始沿 floor 查找，返回第一个命中的模块及结果
    pub fn walk<T, F>(&self, start: &Arc<Module>, mut probe: F) -> Option<(Arc<Module>, T)>
    where
        F: FnMut(&Module) -> Option<T>,
    {
        let mut current = start.clone();
        loop {
            if let Some(value) = probe(current.as_ref()) {
                return Some((current, value));
            }
            current = self.registry.floor(current.id)?;
        }
    }

    // ==================== 设置项 ====================

    /// 查找设置项
    ///
    /// 名称会规范化为 `setting.` 前缀；链耗尽后以不带前缀的名称查询全局默认配置。
    pub fn setting(&self, module: &Arc<Module>, name: &str, default: Option<&str>) -> Option<String> {
        let key = setting_key(name);
        match self.walk(module, |m| m.own_setting(&key)) {
            Some((_, value)) => Some(value),
            None => self.defaults.get(bare_setting_key(name), default),
        }
    }

    /// 整数设置项，无法解析时为 0
    pub fn get_int(&self, module: &Arc<Module>, name: &str) -> i32 {
        self.setting(module, name, None)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// 长整数设置项，无法解析时为 0
    pub fn get_long(&self, module: &Arc<Module>, name: &str) -> i64 {
        self.setting(module, name, None)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// 布尔设置项，仅 `true`（大小写不敏感）为真
    pub fn is_enabled_setting(&self, module: &Arc<Module>, name: &str) -> bool {
        self.setting(module, name, Some("false"))
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// 模块仓库地址（设置项 `<name>_repo`）
    pub fn repo(&self, module: &Arc<Module>) -> Option<String> {
        self.setting(module, &format!("{}_repo", module.name), None)
    }

    // ==================== 静态资源 ====================

    /// 查找 `view/` 下的资源文件
    ///
    /// `in_floor` 为假时只查当前模块。
    pub fn file(&self, module: &Arc<Module>, resource: &str, in_floor: bool) -> Option<ResourceRef> {
        let found = if in_floor {
            self.walk(module, |m| contained_file(&m.view_dir(), resource))
        } else {
            contained_file(&module.view_dir(), resource).map(|p| (module.clone(), p))
        };
        found.map(|(module, path)| ResourceRef { module, path })
    }

    /// 查找资源文件路径
    pub fn resource(&self, module: &Arc<Module>, uri: &str, in_floor: bool) -> Option<PathBuf> {
        self.file(module, uri, in_floor).map(|r| r.path)
    }

    // ==================== 模板 ====================

    /// 查找模板
    ///
    /// 回落到 floor 时更新 `ctx.current`。都未找到且 `allow_empty` 时返回空模板。
    pub fn template(
        &self,
        ctx: &mut RenderContext,
        viewname: &str,
        allow_empty: bool,
    ) -> Option<TemplateRef> {
        loop {
            let module = ctx.current.clone();
            if let Some(path) = contained_file(&module.view_dir(), viewname) {
                debug!(
                    request_id = %ctx.request_id,
                    module_id = %module.id,
                    view = %viewname,
                    "模板命中"
                );
                return Some(TemplateRef::Found { module, path });
            }
            match self.registry.floor(module.id) {
                Some(floor) => ctx.current = floor,
                None => break,
            }
        }

        if allow_empty {
            Some(TemplateRef::Empty)
        } else {
            None
        }
    }

    // ==================== 翻译 ====================

    /// 加载翻译
    ///
    /// 先加载 floor 的翻译，再用本模块的条目覆盖。`@include=<locale>`
    /// 会把另一语言的翻译合并进来，循环包含会被忽略。
    pub fn load_lang(&self, module: &Arc<Module>, locale: &str) -> BTreeMap<String, String> {
        let mut data = BTreeMap::new();
        let mut visiting = HashSet::new();
        self.load_lang_into(module, locale, &mut data, &mut visiting);
        data
    }

    fn load_lang_into(
        &self,
        module: &Arc<Module>,
        locale: &str,
        data: &mut BTreeMap<String, String>,
        visiting: &mut HashSet<(i32, String)>,
    ) {
        let key = (module.id, locale.to_string());
        if !visiting.insert(key.clone()) {
            warn!(module_id = %module.id, locale = %locale, "翻译文件循环包含，忽略");
            return;
        }

        if let Some(floor) = self.registry.floor(module.id) {
            self.load_lang_into(&floor, locale, data, visiting);
        }

        if let Some(file) = lang_path(module, locale) {
            match std::fs::read_to_string(&file) {
                Ok(content) => {
                    for (name, value) in parse_lang(&content) {
                        if name == INCLUDE_DIRECTIVE {
                            self.load_lang_into(module, &value, data, visiting);
                        } else {
                            data.insert(name, value);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => error!(module_id = %module.id, locale = %locale, error = %e, "读取翻译文件失败"),
            }
        }

        visiting.remove(&key);
    }

    /// 默认语言：从 home 开始沿 floor 查找 `default.locale`，找不到时用全局配置
    pub fn default_locale(&self) -> String {
        let from_modules = self.registry.home().and_then(|home| {
            self.walk(&home, |m| m.own_setting(DEFAULT_LOCALE_SETTING))
                .map(|(_, v)| v)
        });
        from_modules
            .or_else(|| self.defaults.get("language", None))
            .unwrap_or_else(|| "en_us".to_string())
    }
}

impl std::fmt::Debug for OverrideChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideChain")
            .field("modules", &self.registry.count())
            .finish()
    }
}

// ============================================================================
// 单模块翻译文件操作
// ============================================================================

fn lang_path(module: &Module, locale: &str) -> Option<PathBuf> {
    contained_path(&module.i18n_dir(), format!("{}.{}", locale, LANG_EXT))
}

/// 解析翻译文本：跳过 `#` 开头的行，按第一个 `=` 拆分
pub fn parse_lang(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let pos = line.find('=')?;
            if pos == 0 {
                return None;
            }
            Some((line[..pos].trim().to_string(), line[pos + 1..].trim().to_string()))
        })
        .collect()
}

/// 把缺失的翻译键写入模块自己的翻译文件（值等于键）
///
/// # Errors
///
/// `locale` 越出 `i18n/` 目录时返回 `PathEscape`
pub fn put_lang(module: &Module, locale: &str, name: &str) -> Result<()> {
    let file = lang_path(module, locale).ok_or_else(|| CoreError::PathEscape(locale.to_string()))?;
    let mut entries = BTreeMap::new();
    entries.insert(name.to_string(), name.to_string());

    match std::fs::read_to_string(&file) {
        Ok(content) => {
            for (k, v) in parse_lang(&content) {
                entries.insert(k, v);
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Err(e) => return Err(e.into()),
    }

    let mut out = String::new();
    for (k, v) in &entries {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
    std::fs::write(&file, out)?;
    debug!(module_id = %module.id, locale = %locale, key = %name, "翻译键已补充");
    Ok(())
}

/// 模块是否提供该语言的翻译文件
pub fn supports_locale(module: &Module, locale: &str) -> bool {
    lang_path(module, locale).map_or(false, |p| p.exists())
}

/// 模块 `i18n/` 目录下的条目名
pub fn supported_locales(module: &Module) -> Vec<String> {
    list_dir(&module.i18n_dir())
        .into_iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

/// `i18n/<locale>/` 目录下的所有文件
pub fn lang_files(module: &Module, locale: &str) -> Vec<PathBuf> {
    contained_path(&module.i18n_dir(), locale)
        .map(|dir| list_dir(&dir))
        .unwrap_or_default()
}

/// 读取 `i18n/<locale>/<lang>`，行尾统一为 `\r\n`
pub fn read_lang_file(module: &Module, locale: &str, lang: &str) -> Option<String> {
    let file = contained_path(&module.i18n_dir(), Path::new(locale).join(lang))?;
    match std::fs::read_to_string(&file) {
        Ok(content) => Some(content.lines().map(|l| format!("{}\r\n", l)).collect()),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(path = %file.display(), error = %e, "读取翻译文件失败");
            }
            None
        }
    }
}

/// 覆盖写入已存在的 `i18n/<locale>/<lang>`，文件不存在或越界时返回 `false`
pub fn update_lang_file(module: &Module, locale: &str, lang: &str, text: &str) -> Result<bool> {
    let file = match contained_path(&module.i18n_dir(), Path::new(locale).join(lang)) {
        Some(file) if file.exists() => file,
        _ => return Ok(false),
    };
    std::fs::write(&file, format!("{}\n", text))?;
    Ok(true)
}

/// 模块菜单定义
///
/// 读取本模块 `view/install/menu.json`（不查 floor），不存在时返回默认骨架。
pub fn menu_json(module: &Module) -> Result<String> {
    match contained_file(&module.view_dir(), MENU_FILE) {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let skeleton = serde_json::json!([
                { "name": "admin", "childs": [] },
                { "name": "home", "childs": [] },
                { "name": "user", "childs": [] },
            ]);
            Ok(serde_json::to_string_pretty(&skeleton)?)
        }
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

/// `root` 下的相对路径，存在且规范化后仍在 `root` 内时返回规范化路径
fn contained_file(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = root.join(relative.trim_start_matches('/'));
    if !candidate.exists() {
        return None;
    }
    let canonical = candidate.canonicalize().ok()?;
    let base = root.canonicalize().ok()?;
    if canonical.starts_with(&base) {
        Some(canonical)
    } else {
        warn!(path = %candidate.display(), "路径越界，拒绝访问");
        None
    }
}

/// `root` 下的相对路径（不要求存在）
///
/// 含 `..` 或绝对路径时返回 `None`；已存在的最近上级目录解析符号链接后
/// 也必须仍在 `root` 内。
fn contained_path(root: &Path, relative: impl AsRef<Path>) -> Option<PathBuf> {
    let relative = relative.as_ref();
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !plain {
        warn!(path = %relative.display(), "路径越界，拒绝访问");
        return None;
    }

    let candidate = root.join(relative);
    let mut existing = candidate.as_path();
    while !existing.exists() {
        match existing.parent() {
            Some(parent) => existing = parent,
            None => return Some(candidate),
        }
    }
    match (existing.canonicalize(), root.canonicalize()) {
        (Ok(resolved), Ok(base)) if !resolved.starts_with(&base) => {
            warn!(path = %candidate.display(), "路径越界，拒绝访问");
            None
        }
        _ => Some(candidate),
    }
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    let mut list: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(_) => Vec::new(),
    };
    list.sort();
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GlobalSettings;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        chain: OverrideChain,
    }

    impl Fixture {
        fn new(ids: &[(i32, &str)]) -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().to_path_buf();
            let registry = Arc::new(ModuleRegistry::new());
            for (id, name) in ids {
                let dir = root.join(name);
                std::fs::create_dir_all(dir.join("view")).unwrap();
                registry
                    .register(Module::builder(*id, *name).path(&dir).build())
                    .unwrap();
            }
            let mut defaults = BTreeMap::new();
            defaults.insert("site.title".to_string(), "Global".to_string());
            defaults.insert("language".to_string(), "zh_cn".to_string());
            let chain = OverrideChain::new(registry, Arc::new(GlobalSettings::new(defaults)));
            Self {
                _temp: temp,
                root,
                chain,
            }
        }

        fn module(&self, id: i32) -> Arc<Module> {
            self.chain.registry().get(id).unwrap()
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn test_setting_walks_floor() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        fx.module(0).set("title", "Base");

        let blog = fx.module(3);
        assert_eq!(fx.chain.setting(&blog, "title", None), Some("Base".to_string()));

        blog.set("title", "Blog");
        assert_eq!(fx.chain.setting(&blog, "setting.title", None), Some("Blog".to_string()));
    }

    #[test]
    fn test_setting_global_fallback() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        let blog = fx.module(3);

        assert_eq!(fx.chain.setting(&blog, "site.title", None), Some("Global".to_string()));
        assert_eq!(fx.chain.setting(&blog, "setting.site.title", None), Some("Global".to_string()));
        assert_eq!(fx.chain.setting(&blog, "missing", Some("d")), Some("d".to_string()));
        assert_eq!(fx.chain.setting(&blog, "missing", None), None);
    }

    #[test]
    fn test_setting_idempotent() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        fx.module(0).set("k", "v");
        let blog = fx.module(3);
        let first = fx.chain.setting(&blog, "k", None);
        let second = fx.chain.setting(&blog, "k", None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_typed_settings() {
        let fx = Fixture::new(&[(0, "default")]);
        let m = fx.module(0);
        m.set("count", "42");
        m.set("big", "9000000000");
        m.set("flag", "TRUE");
        m.set("bad", "x");
        m.set("default_repo", "https://repo");

        assert_eq!(fx.chain.get_int(&m, "count"), 42);
        assert_eq!(fx.chain.get_long(&m, "big"), 9_000_000_000);
        assert_eq!(fx.chain.get_int(&m, "bad"), 0);
        assert!(fx.chain.is_enabled_setting(&m, "flag"));
        assert!(!fx.chain.is_enabled_setting(&m, "missing"));
        assert_eq!(fx.chain.repo(&m), Some("https://repo".to_string()));
    }

    #[test]
    fn test_resource_fallback() {
        let fx = Fixture::new(&[(0, "default"), (5, "shop")]);
        fx.write("default/view/css/site.css", "body{}");

        let shop = fx.module(5);
        let found = fx.chain.file(&shop, "/css/site.css", true).unwrap();
        assert_eq!(found.module.id, 0);
        assert!(fx.chain.resource(&shop, "/css/site.css", false).is_none());

        fx.write("shop/view/css/site.css", "body{color:red}");
        let found = fx.chain.file(&shop, "css/site.css", true).unwrap();
        assert_eq!(found.module.id, 5);
    }

    #[test]
    fn test_resource_path_escape() {
        let fx = Fixture::new(&[(0, "default")]);
        fx.write("default/secret.txt", "secret");
        fx.write("outside.txt", "outside");

        let m = fx.module(0);
        assert!(fx.chain.resource(&m, "../secret.txt", true).is_none());
        assert!(fx.chain.resource(&m, "/../../outside.txt", true).is_none());
    }

    #[test]
    fn test_template_updates_current() {
        let fx = Fixture::new(&[(0, "default"), (2, "base"), (5, "blog")]);
        fx.write("base/view/index.html", "<html/>");

        let mut ctx = RenderContext::new(fx.module(5));
        let found = fx.chain.template(&mut ctx, "index.html", false).unwrap();
        assert_eq!(found.module().unwrap().id, 2);
        assert_eq!(ctx.current.id, 2);
    }

    #[test]
    fn test_template_empty() {
        let fx = Fixture::new(&[(0, "default"), (5, "blog")]);

        let mut ctx = RenderContext::new(fx.module(5));
        assert!(fx.chain.template(&mut ctx, "missing.html", false).is_none());

        let mut ctx = RenderContext::new(fx.module(5));
        let empty = fx.chain.template(&mut ctx, "missing.html", true).unwrap();
        assert!(matches!(empty, TemplateRef::Empty));
        assert!(empty.path().is_none());
        assert_eq!(ctx.current.id, 0);
    }

    #[test]
    fn test_load_lang_override_and_include() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        fx.write("default/i18n/en_us.lang", "# comment\nhello=Hello\nbye=Bye\n");
        fx.write("blog/i18n/en_us.lang", "hello=Hi\n@include=common\n");
        fx.write("blog/i18n/common.lang", "ok=OK\n@include=en_us\n");

        let data = fx.chain.load_lang(&fx.module(3), "en_us");
        assert_eq!(data.get("hello").map(String::as_str), Some("Hi"));
        assert_eq!(data.get("bye").map(String::as_str), Some("Bye"));
        assert_eq!(data.get("ok").map(String::as_str), Some("OK"));
        assert!(!data.contains_key("@include"));
    }

    #[test]
    fn test_put_lang() {
        let fx = Fixture::new(&[(0, "default")]);
        let m = fx.module(0);
        put_lang(&m, "en_us", "title").unwrap();
        fx.write("default/i18n/en_us.lang", "b=B\ntitle=title\n");
        put_lang(&m, "en_us", "a").unwrap();

        let content = std::fs::read_to_string(fx.root.join("default/i18n/en_us.lang")).unwrap();
        assert_eq!(content, "a=a\nb=B\ntitle=title\n");
        assert!(supports_locale(&m, "en_us"));
        assert!(!supports_locale(&m, "fr_fr"));
    }

    #[test]
    fn test_lang_files() {
        let fx = Fixture::new(&[(0, "default")]);
        let m = fx.module(0);
        fx.write("default/i18n/en_us.lang", "a=A\n");
        fx.write("default/i18n/en_us/mail.txt", "line1\nline2");

        assert_eq!(supported_locales(&m), vec!["en_us", "en_us.lang"]);
        assert_eq!(lang_files(&m, "en_us").len(), 1);
        assert_eq!(read_lang_file(&m, "en_us", "mail.txt"), Some("line1\r\nline2\r\n".to_string()));

        assert!(update_lang_file(&m, "en_us", "mail.txt", "new").unwrap());
        assert!(!update_lang_file(&m, "en_us", "other.txt", "new").unwrap());
        assert_eq!(read_lang_file(&m, "en_us", "mail.txt"), Some("new\r\n".to_string()));
    }

    #[test]
    fn test_lang_file_path_escape() {
        let fx = Fixture::new(&[(0, "default")]);
        let m = fx.module(0);
        fx.write("outside.txt", "original\n");
        fx.write("outside.lang", "k=v\n");
        fx.write("default/i18n/zh_cn/mail.txt", "hi");

        assert!(read_lang_file(&m, "zh_cn", "../../../outside.txt").is_none());
        assert!(read_lang_file(&m, "../..", "outside.txt").is_none());
        assert!(!update_lang_file(&m, "zh_cn", "../../../outside.txt", "changed").unwrap());
        assert_eq!(
            std::fs::read_to_string(fx.root.join("outside.txt")).unwrap(),
            "original\n"
        );

        assert!(lang_files(&m, "../..").is_empty());
        assert!(!supports_locale(&m, "../../outside"));
        assert!(fx.chain.load_lang(&m, "../../outside").is_empty());

        let result = put_lang(&m, "../../evil", "k");
        assert!(matches!(result, Err(CoreError::PathEscape(_))));
        assert!(!fx.root.join("evil.lang").exists());

        assert_eq!(read_lang_file(&m, "zh_cn", "mail.txt"), Some("hi\r\n".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_lang_file_symlink_escape() {
        let fx = Fixture::new(&[(0, "default")]);
        let m = fx.module(0);
        fx.write("shared/secret.txt", "secret");
        fx.write("default/i18n/en_us.lang", "a=A\n");
        std::os::unix::fs::symlink(fx.root.join("shared"), fx.root.join("default/i18n/linked"))
            .unwrap();

        assert!(read_lang_file(&m, "linked", "secret.txt").is_none());
        assert!(!update_lang_file(&m, "linked", "secret.txt", "x").unwrap());
        assert!(lang_files(&m, "linked").is_empty());
        assert_eq!(std::fs::read_to_string(fx.root.join("shared/secret.txt")).unwrap(), "secret");
    }

    #[test]
    fn test_template_path_escape() {
        let fx = Fixture::new(&[(0, "default"), (5, "blog")]);
        fx.write("default/secret.html", "secret");
        fx.write("blog/secret.html", "secret");

        let mut ctx = RenderContext::new(fx.module(5));
        assert!(fx.chain.template(&mut ctx, "../secret.html", false).is_none());
        assert_eq!(ctx.current.id, 0);

        let mut ctx = RenderContext::new(fx.module(5));
        let found = fx.chain.template(&mut ctx, "../../default/secret.html", true);
        assert!(matches!(found, Some(TemplateRef::Empty)));
        assert!(fx.chain.registry().get(ctx.current.id).is_some());
    }

    #[test]
    fn test_menu_json() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        fx.write("default/view/install/menu.json", "[{\"name\":\"base\"}]");

        assert_eq!(menu_json(&fx.module(0)).unwrap(), "[{\"name\":\"base\"}]");

        let skeleton: serde_json::Value =
            serde_json::from_str(&menu_json(&fx.module(3)).unwrap()).unwrap();
        assert_eq!(skeleton.as_array().unwrap().len(), 3);
        assert_eq!(skeleton[0]["name"], "admin");
    }

    #[test]
    fn test_default_locale() {
        let fx = Fixture::new(&[(0, "default"), (3, "blog")]);
        assert_eq!(fx.chain.default_locale(), "zh_cn");

        fx.module(0).set(DEFAULT_LOCALE_SETTING, "en_us");
        assert_eq!(fx.chain.default_locale(), "en_us");

        fx.module(3).set(DEFAULT_LOCALE_SETTING, "fr_fr");
        assert_eq!(fx.chain.default_locale(), "fr_fr");
    }
}
