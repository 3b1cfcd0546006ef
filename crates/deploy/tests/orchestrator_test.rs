//! End-to-end tests of the orchestration pipeline.
//!
//! A scripted deployer stands in for the network: it hands out random addresses, records
//! the arguments of every call and can be told to fail on a given call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use keystone_deploy::{
    Artifact, ArgumentSpec, ArtifactStore, ConfigResolver, ContractDeployer, DeployError,
    DeploymentManifest, DeploymentObserver, DeploymentResult, DeploymentUnit, Deployment,
    Orchestrator, SignerIdentity,
};
use tokio::sync::watch;

/// One recorded deploy call.
#[derive(Debug, Clone)]
struct Call {
    artifact: String,
    args: Vec<String>,
    address: Address,
}

#[derive(Default)]
struct ScriptedDeployer {
    calls: Mutex<Vec<Call>>,
    /// Zero-based call index to fail on, and the error to fail with.
    failure: Option<(usize, fn() -> DeployError)>,
}

impl ScriptedDeployer {
    fn failing_on(call: usize, error: fn() -> DeployError) -> Self {
        Self {
            calls: Mutex::default(),
            failure: Some((call, error)),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn args_of(&self, artifact: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .find(|c| c.artifact == artifact)
            .map(|c| c.args)
            .unwrap()
    }
}

impl ContractDeployer for ScriptedDeployer {
    async fn deploy(
        &self,
        artifact: &Artifact,
        args: &[String],
        _signer: &SignerIdentity,
    ) -> Result<Deployment, DeployError> {
        let mut calls = self.calls.lock().unwrap();
        let address = Address::from(rand::random::<[u8; 20]>());
        let index = calls.len();

        calls.push(Call {
            artifact: artifact.name.clone(),
            args: args.to_vec(),
            address,
        });

        if let Some((fail_at, error)) = self.failure {
            if fail_at == index {
                return Err(error());
            }
        }

        Ok(Deployment {
            address,
            transaction: B256::from(rand::random::<[u8; 32]>()),
        })
    }
}

/// Sends the cancellation signal once a given number of units is deployed.
struct CancelAfter {
    deployed: Mutex<usize>,
    after: usize,
    cancel: watch::Sender<bool>,
}

impl DeploymentObserver for CancelAfter {
    fn on_deployed(&self, _result: &DeploymentResult) {
        let mut deployed = self.deployed.lock().unwrap();
        *deployed += 1;
        if *deployed == self.after {
            self.cancel.send_replace(true);
        }
    }
}

/// Collects observer events as strings.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<String>>>);

impl DeploymentObserver for EventLog {
    fn on_skipped(&self, unit: &DeploymentUnit, _address: Address) {
        self.0.lock().unwrap().push(format!("skipped {}", unit.name));
    }

    fn on_deployed(&self, result: &DeploymentResult) {
        self.0.lock().unwrap().push(format!("deployed {}", result.unit));
    }

    fn on_failed(&self, unit: &DeploymentUnit, error: &DeployError) {
        self.0
            .lock()
            .unwrap()
            .push(format!("failed {} {}", unit.name, error.kind()));
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn store(names: &[&str]) -> ArtifactStore {
    ArtifactStore::in_memory(
        names
            .iter()
            .map(|name| Artifact::new(*name, JsonAbi::default(), vec![0x60, 0x80])),
    )
}

fn signer() -> SignerIdentity {
    SignerIdentity::new(Address::repeat_byte(0x5e))
}

fn staking_units() -> Vec<DeploymentUnit> {
    vec![
        DeploymentUnit::new("TokenA"),
        DeploymentUnit::new("TokenB"),
        DeploymentUnit::new("Staking")
            .args([ArgumentSpec::unit("TokenA"), ArgumentSpec::unit("TokenB")]),
    ]
}

fn staking_orchestrator(deployer: ScriptedDeployer) -> Orchestrator<ScriptedDeployer> {
    Orchestrator::new(
        store(&["TokenA", "TokenB", "Staking"]),
        ConfigResolver::default(),
        deployer,
    )
}

#[tokio::test]
async fn test_references_resolve_to_deployed_addresses() {
    init_tracing();
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::default());

    let results = orchestrator.run(staking_units(), &signer()).await.unwrap();

    let units: Vec<_> = results.iter().map(|r| r.unit.as_str()).collect();
    assert_eq!(units, vec!["TokenA", "TokenB", "Staking"]);
    assert_eq!(orchestrator.registry().len(), 3);

    let token_a = orchestrator.registry().lookup("TokenA").unwrap();
    let token_b = orchestrator.registry().lookup("TokenB").unwrap();
    assert_eq!(
        orchestrator.deployer().args_of("Staking"),
        vec![token_a.to_string(), token_b.to_string()]
    );
    assert_eq!(results[2].address, orchestrator.deployer().calls()[2].address);
}

#[tokio::test]
async fn test_cycle_fails_before_any_deployment() {
    let mut orchestrator = Orchestrator::new(
        store(&["X", "Y"]),
        ConfigResolver::default(),
        ScriptedDeployer::default(),
    );

    let err = orchestrator
        .run(
            vec![
                DeploymentUnit::new("X").arg(ArgumentSpec::unit("Y")),
                DeploymentUnit::new("Y").arg(ArgumentSpec::unit("X")),
            ],
            &signer(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.source, DeployError::CyclicDependency(ref members) if members.contains(&"X".to_string())));
    assert!(err.failed_unit.is_none());
    assert!(orchestrator.registry().is_empty());
    assert!(orchestrator.deployer().calls().is_empty());
}

#[tokio::test]
async fn test_revert_halts_the_run() {
    init_tracing();
    let events = EventLog::default();
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::failing_on(1, || {
        DeployError::TransactionReverted(B256::repeat_byte(0xde))
    }))
    .with_observer(events.clone());

    let err = orchestrator.run(staking_units(), &signer()).await.unwrap_err();

    assert!(matches!(err.source, DeployError::TransactionReverted(_)));
    assert_eq!(err.failed_unit.as_deref(), Some("TokenB"));
    assert_eq!(err.completed.len(), 1);
    assert_eq!(err.last_completed(), Some("TokenA"));
    assert_eq!(orchestrator.registry().len(), 1);
    assert!(orchestrator.registry().contains("TokenA"));
    // Staking is never attempted.
    assert_eq!(orchestrator.deployer().calls().len(), 2);
    assert_eq!(
        *events.0.lock().unwrap(),
        vec!["deployed TokenA", "failed TokenB TransactionReverted"]
    );
}

#[tokio::test]
async fn test_unknown_reference_fails_before_any_deployment() {
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::default());

    let err = orchestrator
        .run(
            vec![
                DeploymentUnit::new("TokenA"),
                DeploymentUnit::new("Staking")
                    .args([ArgumentSpec::unit("TokenA"), ArgumentSpec::unit("RewardToken")]),
            ],
            &signer(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.source,
        DeployError::UnknownUnitReference { ref missing, .. } if missing == "RewardToken"
    ));
    assert!(orchestrator.deployer().calls().is_empty());
}

#[tokio::test]
async fn test_timeout_is_surfaced_without_retry() {
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::failing_on(0, || {
        DeployError::TransactionTimeout {
            tx: B256::repeat_byte(0x01),
            timeout: Duration::from_secs(30),
        }
    }));

    let err = orchestrator.run(staking_units(), &signer()).await.unwrap_err();

    assert!(err.source.is_ambiguous());
    assert_eq!(err.failed_unit.as_deref(), Some("TokenA"));
    assert_eq!(orchestrator.deployer().calls().len(), 1);
    assert!(orchestrator.registry().is_empty());
}

#[tokio::test]
async fn test_unknown_submission_is_surfaced_without_retry() {
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::failing_on(1, || {
        DeployError::SubmissionUnknown {
            tx: None,
            reason: "operation timed out".to_string(),
        }
    }));

    let err = orchestrator
        .run(staking_units(), &signer())
        .await
        .expect_err("the second unit has an unknown outcome");

    assert!(err.source.is_ambiguous());
    assert_eq!(err.last_completed(), Some("TokenA"));
    assert_eq!(orchestrator.deployer().calls().len(), 2);
    assert_eq!(orchestrator.registry().len(), 1);
}

#[tokio::test]
async fn test_resume_skips_deployed_units() {
    init_tracing();
    let mut first = staking_orchestrator(ScriptedDeployer::failing_on(1, || {
        DeployError::NetworkUnavailable("connection refused".to_string())
    }));
    let err = first.run(staking_units(), &signer()).await.unwrap_err();
    let token_a = err.completed[0].address;

    let events = EventLog::default();
    let mut second =
        staking_orchestrator(ScriptedDeployer::default()).with_observer(events.clone());
    second.resume_from(&err.completed).unwrap();

    let results = second.run(staking_units(), &signer()).await.unwrap();

    let deployed: Vec<_> = results.iter().map(|r| r.unit.as_str()).collect();
    assert_eq!(deployed, vec!["TokenB", "Staking"]);
    assert_eq!(second.registry().len(), 3);
    assert_eq!(second.registry().lookup("TokenA").unwrap(), token_a);

    let token_b = second.registry().lookup("TokenB").unwrap();
    assert_eq!(
        second.deployer().args_of("Staking"),
        vec![token_a.to_string(), token_b.to_string()]
    );
    assert_eq!(
        *events.0.lock().unwrap(),
        vec!["skipped TokenA", "deployed TokenB", "deployed Staking"]
    );
}

#[tokio::test]
async fn test_resume_rejects_duplicate_results() {
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::default());
    let result = DeploymentResult {
        unit: "TokenA".to_string(),
        id: None,
        address: Address::repeat_byte(0x0a),
        transaction: B256::ZERO,
    };

    let err = orchestrator
        .resume_from([&result, &result])
        .unwrap_err();

    assert!(matches!(err, DeployError::DuplicateRegistration(name) if name == "TokenA"));
}

#[tokio::test]
async fn test_cancellation_between_units() {
    let (cancel, cancelled) = watch::channel(false);
    let observer = CancelAfter {
        deployed: Mutex::new(0),
        after: 1,
        cancel,
    };
    let mut orchestrator = staking_orchestrator(ScriptedDeployer::default())
        .with_observer(observer)
        .with_cancellation(cancelled);

    let err = orchestrator.run(staking_units(), &signer()).await.unwrap_err();

    assert!(matches!(err.source, DeployError::Cancelled));
    assert_eq!(err.failed_unit.as_deref(), Some("TokenB"));
    assert_eq!(err.completed.len(), 1);
    assert_eq!(orchestrator.deployer().calls().len(), 1);
}

#[tokio::test]
async fn test_strategy_stack_wiring() {
    init_tracing();
    let owner = Address::repeat_byte(0x0e);
    let fee_to = Address::repeat_byte(0x0f);
    let resolver = ConfigResolver::new(
        [("ownerAddress".to_string(), owner.to_string())],
        [("FEE_TO_SETTER".to_string(), fee_to.to_string())],
    );
    let artifacts = store(&[
        "MockERC20",
        "CustomStaking",
        "ERC4626Vault",
        "UniswapV2Factory",
        "UniswapV2Router",
        "Strategy",
    ]);
    let mut orchestrator = Orchestrator::new(artifacts, resolver, ScriptedDeployer::default());

    let results = orchestrator
        .run(DeploymentManifest::strategy_stack().units, &signer())
        .await
        .unwrap();
    assert_eq!(results.len(), 9);

    let deployer = orchestrator.deployer();
    let registry = orchestrator.registry();
    let address = |unit: &str| registry.lookup(unit).unwrap().to_string();

    let token_a = &deployer.calls()[0];
    assert_eq!(token_a.artifact, "MockERC20");
    assert_eq!(
        token_a.args,
        vec![
            "TokenA".to_string(),
            "TKA".to_string(),
            "18".to_string(),
            "1000000000".to_string(),
            owner.to_string()
        ]
    );
    assert_eq!(
        deployer.args_of("UniswapV2Factory"),
        vec![fee_to.to_string(), owner.to_string()]
    );
    assert_eq!(
        deployer.args_of("Strategy"),
        vec![
            address("ERC4626Vault"),
            address("UniswapV2Router"),
            address("CustomStaking"),
            address("RewardToken"),
            address("TokenA"),
            address("TokenB"),
        ]
    );
}
