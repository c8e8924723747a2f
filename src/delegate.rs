//! Delegate provider registry.
//!
//! [`DelegateProviders`] collects delegates enabled outside of [`Params`],
//! typically from `--use_<delegate>` switches, and merges them with the
//! delegate named in the params into the list handed to the runtime.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::params::{Delegate, FlagParser, Params};

/// Flag that sets the thread count given to CPU delegates.
pub const DELEGATE_NUM_THREADS_FLAG: &str = "delegate_num_threads";

/// Settings for one delegate instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateConfig {
    /// Which delegate.
    pub delegate: Delegate,
    /// Threads the delegate may use.
    pub num_threads: usize,
    /// Allow fp16 computation.
    pub allow_fp16: bool,
}

impl DelegateConfig {
    /// Single-threaded fp32 config.
    #[must_use]
    pub fn new(delegate: Delegate) -> Self {
        Self {
            delegate,
            num_threads: 1,
            allow_fp16: false,
        }
    }
}

/// Externally configured delegates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegateProviders {
    enabled: Vec<Delegate>,
    num_threads: Option<usize>,
}

impl DelegateProviders {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume `--use_nnapi`, `--use_gpu`, `--use_hexagon`, `--use_xnnpack`
    /// and `--delegate_num_threads` from `args`.
    pub fn from_args(args: &mut Vec<String>) -> Result<Self> {
        let mut parser = FlagParser::new(args);
        let mut providers = Self::new();

        for delegate in Delegate::ALL {
            if parser.take_switch(use_flag(delegate))? == Some(true) {
                providers.enable(delegate);
            }
        }
        providers.num_threads = parser.take_parsed::<usize>(DELEGATE_NUM_THREADS_FLAG)?;

        Ok(providers)
    }

    /// Enable a delegate. Enabling twice has no effect.
    pub fn enable(&mut self, delegate: Delegate) -> &mut Self {
        if !self.enabled.contains(&delegate) {
            self.enabled.push(delegate);
        }
        self
    }

    /// Set the delegate thread count.
    pub fn set_num_threads(&mut self, threads: usize) -> &mut Self {
        self.num_threads = Some(threads);
        self
    }

    /// Enabled delegates in registration order.
    #[must_use]
    pub fn enabled(&self) -> &[Delegate] {
        &self.enabled
    }

    /// Delegates to apply for `params`: the params' delegate first, then any
    /// other enabled one.
    #[must_use]
    pub fn resolve(&self, params: &Params) -> Vec<DelegateConfig> {
        let mut order: Vec<Delegate> = params.delegate.into_iter().collect();
        for &delegate in &self.enabled {
            if !order.contains(&delegate) {
                order.push(delegate);
            }
        }

        let num_threads = self.num_threads.unwrap_or(params.num_interpreter_threads);
        order
            .into_iter()
            .map(|delegate| DelegateConfig {
                delegate,
                num_threads,
                allow_fp16: params.allow_fp16,
            })
            .collect()
    }
}

fn use_flag(delegate: Delegate) -> &'static str {
    match delegate {
        Delegate::Nnapi => "use_nnapi",
        Delegate::Gpu => "use_gpu",
        Delegate::Hexagon => "use_hexagon",
        Delegate::Xnnpack => "use_xnnpack",
    }
}

/// Delegates for an evaluation, with or without external providers.
#[must_use]
pub fn resolve_delegates(
    params: &Params,
    providers: Option<&DelegateProviders>,
) -> Vec<DelegateConfig> {
    match providers {
        Some(providers) => providers.resolve(params),
        None => DelegateProviders::new().resolve(params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(delegate: Option<Delegate>) -> Params {
        Params::builder()
            .ground_truth_images_path("/images")
            .ground_truth_labels_path("/gt.txt")
            .model_output_labels_path("/labels.txt")
            .model_file_path("/model.csv")
            .delegate(delegate)
            .num_interpreter_threads(4)
            .allow_fp16(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_from_args() {
        let mut args: Vec<String> = [
            "--use_gpu",
            "--use_nnapi=false",
            "--use_xnnpack=true",
            "--other",
            "--delegate_num_threads=2",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        let providers = DelegateProviders::from_args(&mut args).unwrap();
        assert_eq!(providers.enabled(), &[Delegate::Gpu, Delegate::Xnnpack]);
        assert_eq!(providers.num_threads, Some(2));
        assert_eq!(args, vec!["--other".to_string()]);
    }

    #[test]
    fn test_from_args_space_separated_switches() {
        let mut args: Vec<String> = ["--use_gpu", "0", "--use_hexagon", "1", "model.csv"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let providers = DelegateProviders::from_args(&mut args).unwrap();
        assert_eq!(providers.enabled(), &[Delegate::Hexagon]);
        assert_eq!(args, vec!["model.csv".to_string()]);
    }

    #[test]
    fn test_resolve_params_delegate_first() {
        let mut providers = DelegateProviders::new();
        providers.enable(Delegate::Xnnpack).enable(Delegate::Gpu);

        let configs = providers.resolve(&params(Some(Delegate::Gpu)));
        let order: Vec<_> = configs.iter().map(|c| c.delegate).collect();
        assert_eq!(order, vec![Delegate::Gpu, Delegate::Xnnpack]);
        assert!(configs.iter().all(|c| c.allow_fp16 && c.num_threads == 4));
    }

    #[test]
    fn test_resolve_without_providers() {
        assert!(resolve_delegates(&params(None), None).is_empty());

        let configs = resolve_delegates(&params(Some(Delegate::Hexagon)), None);
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].delegate, Delegate::Hexagon);
    }

    #[test]
    fn test_provider_thread_override() {
        let mut providers = DelegateProviders::new();
        providers.enable(Delegate::Xnnpack).set_num_threads(8);
        let configs = providers.resolve(&params(None));
        assert_eq!(configs[0].num_threads, 8);
    }
}
