use crate::config::Configuration;
use crate::toolchain::{Backend, Optimization};

/// One axis of the build matrix, e.g. "Compiler" or "Target".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    configurations: Vec<(String, Configuration)>,
    selected: usize,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configurations: Vec::new(),
            selected: 0,
        }
    }

    /// Adds a preset, replacing any preset with the same name.
    pub fn add_configuration(&mut self, name: impl Into<String>, config: Configuration) {
        let name = name.into();
        match self.configurations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = config,
            None => self.configurations.push((name, config)),
        }
    }

    pub fn configurations(&self) -> &[(String, Configuration)] {
        &self.configurations
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// The selected preset; the first one unless [`Column::select`] chose
    /// another.
    pub fn current(&self) -> Option<(&str, &Configuration)> {
        self.configurations
            .get(self.selected)
            .map(|(n, c)| (n.as_str(), c))
    }

    pub fn select(&mut self, name: &str) -> bool {
        match self.configurations.iter().position(|(n, _)| n == name) {
            Some(index) => {
                self.selected = index;
                true
            }
            None => false,
        }
    }
}

/// Named configuration presets a workspace chooses between.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildMatrix {
    columns: Vec<Column>,
}

impl BuildMatrix {
    /// The matrix new workspaces start with: one `Compiler` preset per
    /// backend available here, and `Debug`/`Release` targets.
    pub fn with_defaults() -> Self {
        let mut matrix = BuildMatrix::default();

        let compilers = matrix.new_column("Compiler");
        for backend in Backend::available() {
            compilers.add_configuration(
                backend.name(),
                Configuration {
                    compiler: Some(backend),
                    ..Default::default()
                },
            );
        }

        let targets = matrix.new_column("Target");
        for opt in [Optimization::Debug, Optimization::Release] {
            targets.add_configuration(
                opt.name(),
                Configuration {
                    optimization: Some(opt),
                    ..Default::default()
                },
            );
        }
        matrix
    }

    /// Returns the column with this name, creating it at the end if needed.
    pub fn new_column(&mut self, name: &str) -> &mut Column {
        let index = match self.columns.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                self.columns.push(Column::new(name));
                self.columns.len() - 1
            }
        };
        &mut self.columns[index]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Selects `preset` in `column`. Returns `false` if either is unknown.
    pub fn select(&mut self, column: &str, preset: &str) -> bool {
        self.columns
            .iter_mut()
            .find(|c| c.name == column)
            .is_some_and(|c| c.select(preset))
    }

    /// Selected presets of every column, merged in column order.
    pub fn current_configuration(&self) -> Configuration {
        let mut config = Configuration::default();
        for (_, preset) in self.columns.iter().filter_map(Column::current) {
            config.override_with(preset);
        }
        config
    }
}
