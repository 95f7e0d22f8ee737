//! Project file tree for a preview environment.
//!
//! Every environment runs a Vite + React + TypeScript project whose
//! `src/App.tsx` is the supplied code. The tree is written to a fresh
//! temporary directory that is removed when the returned [`TempDir`] is
//! closed or dropped.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;
use tracing::debug;

use crate::error::{SandboxError, SandboxResult};

/// Package maps overriding the template defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(
        default,
        rename = "devDependencies",
        skip_serializing_if = "Option::is_none"
    )]
    pub dev_dependencies: Option<BTreeMap<String, String>>,
}

fn package_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(name, version)| (name.to_string(), version.to_string()))
        .collect()
}

fn default_dependencies() -> BTreeMap<String, String> {
    package_map(&[
        ("react", "^18.2.0"),
        ("react-dom", "^18.2.0"),
        ("typescript", "^5.0.0"),
        ("vite", "^5.0.0"),
        ("@vitejs/plugin-react", "^4.0.0"),
    ])
}

fn default_dev_dependencies() -> BTreeMap<String, String> {
    package_map(&[
        ("@types/react", "^18.2.0"),
        ("@types/react-dom", "^18.2.0"),
        ("@typescript-eslint/eslint-plugin", "^6.0.0"),
        ("@typescript-eslint/parser", "^6.0.0"),
        ("eslint", "^8.45.0"),
        ("eslint-plugin-react-hooks", "^4.6.0"),
        ("eslint-plugin-react-refresh", "^0.4.3"),
        ("vitest", "^0.34.0"),
    ])
}

const MAIN_TSX: &str = r#"import React from 'react'
import ReactDOM from 'react-dom/client'
import App from './App.tsx'
import './index.css'

ReactDOM.createRoot(document.getElementById('root')!).render(
  <React.StrictMode>
    <App />
  </React.StrictMode>,
)
"#;

const INDEX_CSS: &str = r#"@tailwind base;
@tailwind components;
@tailwind utilities;

body {
  margin: 0;
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', 'Roboto', 'Oxygen',
    'Ubuntu', 'Cantarell', 'Fira Sans', 'Droid Sans', 'Helvetica Neue',
    sans-serif;
  -webkit-font-smoothing: antialiased;
  -moz-osx-font-smoothing: grayscale;
}

code {
  font-family: source-code-pro, Menlo, Monaco, Consolas, 'Courier New',
    monospace;
}
"#;

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <link rel="icon" type="image/svg+xml" href="/vite.svg" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Generated App</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.tsx"></script>
  </body>
</html>
"#;

const TAILWIND_CONFIG: &str = r#"/** @type {import('tailwindcss').Config} */
export default {
  content: [
    "./index.html",
    "./src/**/*.{js,ts,jsx,tsx}",
  ],
  theme: {
    extend: {},
  },
  plugins: [],
}
"#;

const POSTCSS_CONFIG: &str = r#"export default {
  plugins: {
    tailwindcss: {},
    autoprefixer: {},
  },
}
"#;

/// Writes the project tree and its Dockerfile.
#[derive(Debug, Clone)]
pub struct ProjectTemplate {
    base_image: String,
    app_port: u16,
}

impl ProjectTemplate {
    pub fn new(base_image: impl Into<String>, app_port: u16) -> Self {
        Self {
            base_image: base_image.into(),
            app_port,
        }
    }

    /// Materialize the project into a new temporary directory.
    pub fn materialize(&self, code: &str, dependencies: &Dependencies) -> SandboxResult<TempDir> {
        let dir = tempfile::Builder::new().prefix("sandbox_").tempdir()?;
        // An error drops `dir`, which removes the partial tree.
        self.write_tree(dir.path(), code, dependencies)?;
        debug!("Materialized project tree at {:?}", dir.path());
        Ok(dir)
    }

    fn write_tree(&self, root: &Path, code: &str, dependencies: &Dependencies) -> SandboxResult<()> {
        write_json(root, "package.json", &self.package_json(dependencies))?;
        fs::write(root.join("vite.config.ts"), self.vite_config())?;
        write_json(root, "tsconfig.json", &tsconfig())?;
        write_json(root, "tsconfig.node.json", &tsconfig_node())?;
        fs::write(root.join("index.html"), INDEX_HTML)?;
        fs::write(root.join("tailwind.config.js"), TAILWIND_CONFIG)?;
        fs::write(root.join("postcss.config.js"), POSTCSS_CONFIG)?;

        let src = root.join("src");
        fs::create_dir_all(&src)?;
        fs::write(src.join("main.tsx"), MAIN_TSX)?;
        fs::write(src.join("App.tsx"), code)?;
        fs::write(src.join("index.css"), INDEX_CSS)?;

        fs::write(root.join("Dockerfile"), self.dockerfile())?;
        Ok(())
    }

    fn package_json(&self, dependencies: &Dependencies) -> serde_json::Value {
        json!({
            "name": "generated-app",
            "version": "1.0.0",
            "type": "module",
            "scripts": {
                "dev": "vite",
                "build": "tsc && vite build",
                "preview": "vite preview",
                "test": "vitest",
                "lint": "eslint . --ext ts,tsx --report-unused-disable-directives --max-warnings 0"
            },
            "dependencies": dependencies
                .dependencies
                .clone()
                .unwrap_or_else(default_dependencies),
            "devDependencies": dependencies
                .dev_dependencies
                .clone()
                .unwrap_or_else(default_dev_dependencies),
        })
    }

    fn vite_config(&self) -> String {
        format!(
            r#"import {{ defineConfig }} from 'vite'
import react from '@vitejs/plugin-react'

export default defineConfig({{
  plugins: [react()],
  server: {{
    host: '0.0.0.0',
    port: {}
  }}
}})
"#,
            self.app_port
        )
    }

    /// Dockerfile for the instance image.
    ///
    /// The project directory is bind-mounted at `/app`, so dependencies are
    /// installed when the container starts rather than at build time.
    pub fn dockerfile(&self) -> String {
        format!(
            r#"FROM {}

WORKDIR /app

RUN apk add --no-cache nodejs npm

EXPOSE {}

CMD ["sh", "-c", "npm install && npm run dev -- --host 0.0.0.0"]
"#,
            self.base_image, self.app_port
        )
    }
}

fn tsconfig() -> serde_json::Value {
    json!({
        "compilerOptions": {
            "target": "ES2020",
            "useDefineForClassFields": true,
            "lib": ["ES2020", "DOM", "DOM.Iterable"],
            "module": "ESNext",
            "skipLibCheck": true,
            "moduleResolution": "bundler",
            "allowImportingTsExtensions": true,
            "resolveJsonModule": true,
            "isolatedModules": true,
            "noEmit": true,
            "jsx": "react-jsx",
            "strict": true,
            "noUnusedLocals": true,
            "noUnusedParameters": true,
            "noFallthroughCasesInSwitch": true
        },
        "include": ["src"],
        "references": [{"path": "./tsconfig.node.json"}]
    })
}

fn tsconfig_node() -> serde_json::Value {
    json!({
        "compilerOptions": {
            "composite": true,
            "skipLibCheck": true,
            "module": "ESNext",
            "moduleResolution": "bundler",
            "allowSyntheticDefaultImports": true
        },
        "include": ["vite.config.ts"]
    })
}

fn write_json(root: &Path, name: &str, value: &serde_json::Value) -> SandboxResult<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| SandboxError::Template(format!("{}: {}", name, e)))?;
    fs::write(root.join(name), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "export default function App() { return <h1>Todo</h1> }\n";

    #[test]
    fn test_materialize_writes_tree() {
        let template = ProjectTemplate::new("node:18-alpine", 3000);
        let dir = template.materialize(APP, &Dependencies::default()).unwrap();
        let root = dir.path();

        for file in [
            "package.json",
            "vite.config.ts",
            "tsconfig.json",
            "tsconfig.node.json",
            "index.html",
            "tailwind.config.js",
            "postcss.config.js",
            "Dockerfile",
            "src/main.tsx",
            "src/App.tsx",
            "src/index.css",
        ] {
            assert!(root.join(file).exists(), "missing {}", file);
        }
        assert_eq!(fs::read_to_string(root.join("src/App.tsx")).unwrap(), APP);
        assert!(fs::read_to_string(root.join("vite.config.ts"))
            .unwrap()
            .contains("port: 3000"));
    }

    #[test]
    fn test_dependencies_override_defaults() {
        let mut deps = BTreeMap::new();
        deps.insert("preact".to_string(), "^10.0.0".to_string());
        let overrides = Dependencies {
            dependencies: Some(deps),
            dev_dependencies: None,
        };

        let template = ProjectTemplate::new("node:18-alpine", 3000);
        let dir = template.materialize(APP, &overrides).unwrap();
        let package: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("package.json")).unwrap())
                .unwrap();

        assert_eq!(package["dependencies"]["preact"], "^10.0.0");
        assert!(package["dependencies"].get("react").is_none());
        assert_eq!(package["devDependencies"]["vitest"], "^0.34.0");
    }

    #[test]
    fn test_dockerfile_uses_base_image() {
        let dockerfile = ProjectTemplate::new("node:20-alpine", 5173).dockerfile();
        assert!(dockerfile.starts_with("FROM node:20-alpine"));
        assert!(dockerfile.contains("EXPOSE 5173"));
    }

    #[test]
    fn test_close_removes_directory() {
        let dir = ProjectTemplate::new("node:18-alpine", 3000)
            .materialize(APP, &Dependencies::default())
            .unwrap();
        let path = dir.path().to_path_buf();

        dir.close().unwrap();
        assert!(!path.exists());
    }
}
