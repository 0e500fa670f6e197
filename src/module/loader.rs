//! 模块描述文件加载器
//!
//! 负责解析模块目录下的 `module.ini`，并把模块信息写回磁盘。
//!
//! 描述文件为 `key=value` 格式，`#` 或 `!` 开头的行为注释：
//!
//! ```text
//! name=blog
//! id=3
//! package=org.blog.web
//! enabled=true
//! setting.title=My Blog
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::record::{Module, SETTING_PREFIX};
use crate::utils::{CoreError, Result};

/// 描述文件名
pub const DESCRIPTOR_FILE: &str = "module.ini";

/// 解析 `key=value` 格式的属性文本
///
/// 同时接受 `key: value`，键值两端空白会被去掉。
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line.find(|c: char| c == '=' || c == ':');
        let (key, value) = match split {
            Some(pos) => (&line[..pos], &line[pos + 1..]),
            None => (line, ""),
        };
        props.insert(key.trim().to_string(), value.trim().to_string());
    }
    props
}

/// 模块描述文件加载器
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    /// 模块根目录（`<home>/modules`）
    root: PathBuf,
}

impl ModuleLoader {
    /// 创建加载器
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 模块根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 模块目录
    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// 从描述文件内容解析模块
    ///
    /// # Arguments
    ///
    /// * `content` - 描述文件内容
    /// * `dir` - 模块目录
    ///
    /// # Errors
    ///
    /// 缺少 `name` 或 `id`，或 `id` 不是整数时返回 `DescriptorInvalid`
    pub fn parse(content: &str, dir: &Path) -> Result<Module> {
        let props = parse_properties(content);
        let folder = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let name = props
            .get("name")
            .filter(|n| !n.is_empty())
            .cloned()
            .ok_or_else(|| CoreError::descriptor(&folder, "缺少 name"))?;

        let id = match props.get("id") {
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                CoreError::descriptor(&name, format!("id 不是整数: '{}'", raw))
            })?,
            None => return Err(CoreError::descriptor(&name, "缺少 id")),
        };

        let enabled = props
            .get("enabled")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mut builder = Module::builder(id, name).path(dir).enabled(enabled);
        if let Some(v) = props.get("package").filter(|v| !v.is_empty()) {
            builder = builder.package(v);
        }
        if let Some(v) = props.get("lifelistener").filter(|v| !v.is_empty()) {
            builder = builder.lifelistener(v);
        }
        if let Some(v) = props.get("version") {
            builder = builder.version(v);
        }
        if let Some(v) = props.get("build") {
            builder = builder.build_number(v);
        }
        if let Some(v) = props.get("screenshot") {
            builder = builder.screenshot(v);
        }
        if let Some(v) = props.get("readme") {
            builder = builder.readme(v);
        }
        for (key, value) in props.iter().filter(|(k, _)| k.starts_with(SETTING_PREFIX)) {
            builder = builder.setting(key, value);
        }

        Ok(builder.build())
    }

    /// 加载指定目录名的模块
    ///
    /// # Errors
    ///
    /// - 描述文件不存在或无法读取时返回 IO 错误
    /// - 描述文件内容无效时返回 `DescriptorInvalid`
    pub async fn load(&self, name: &str) -> Result<Module> {
        let dir = self.module_dir(name);
        let file = dir.join(DESCRIPTOR_FILE);
        debug!(module_name = %name, path = %file.display(), "读取模块描述文件");

        let content = tokio::fs::read_to_string(&file).await?;
        Self::parse(&content, &dir)
    }

    /// 模块描述文件是否可加载
    pub async fn is_installed(&self, name: &str) -> bool {
        self.load(name).await.is_ok()
    }

    /// 把模块信息写回描述文件
    pub async fn store(&self, module: &Module) -> Result<()> {
        let mut lines = vec![
            format!("name={}", module.name),
            format!("id={}", module.id),
            format!("enabled={}", module.enabled()),
            format!("screenshot={}", module.screenshot),
        ];
        let optional = [
            ("package", &module.package),
            ("lifelistener", &module.lifelistener),
            ("version", &module.version),
            ("build", &module.build),
            ("readme", &module.readme),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                lines.push(format!("{}={}", key, v));
            }
        }
        for (key, value) in module.settings() {
            lines.push(format!("{}={}", key, value));
        }
        lines.push(String::new());

        let file = module.descriptor_path();
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, lines.join("\n")).await?;

        info!(module_id = %module.id, module_name = %module.name, "模块描述文件已保存");
        Ok(())
    }

    /// 列出模块根目录下的所有子目录名（按名称排序）
    pub async fn scan(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.root.display(), "模块目录不存在");
                return Ok(names);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// 列出已安装但未启用的模块
    pub async fn list_disabled(&self) -> Result<Vec<Module>> {
        let mut disabled = Vec::new();
        for name in self.scan().await? {
            match self.load(&name).await {
                Ok(m) if !m.enabled() => disabled.push(m),
                Ok(_) => {}
                Err(e) => debug!(module_name = %name, error = %e, "跳过无效模块"),
            }
        }
        Ok(disabled)
    }

    /// 删除模块目录
    pub async fn delete(&self, module: &Module) -> Result<()> {
        if !module.lives_in(&self.root) {
            error!(module_name = %module.name, path = %module.path.display(), "模块不在模块目录下，拒绝删除");
            return Err(CoreError::Internal(format!(
                "模块路径不在模块目录下: {}",
                module.path.display()
            )));
        }
        tokio::fs::remove_dir_all(&module.path).await?;
        info!(module_id = %module.id, module_name = %module.name, "模块目录已删除");
        Ok(())
    }
}
