//! Contract bindings for the marketplace protocol.
//!
//! Human-readable ABI fragments, limited to the functions and events
//! this client actually calls.

use ethers::prelude::abigen;

abigen!(
    JobMarketplace,
    r#"[
        function createSessionJobWithToken(address host, address token, uint256 deposit, uint256 pricePerToken, uint256 maxDuration, uint256 proofInterval) returns (uint256)
        function createSessionFromDepositForModel(address host, bytes32 modelId, address token, uint256 deposit, uint256 pricePerToken, uint256 maxDuration, uint256 proofInterval) returns (uint256)
        function depositToken(address token, uint256 amount)
        function withdrawToken(address token, uint256 amount)
        function getDepositBalance(address user, address token) view returns (uint256)
        function completeSessionJob(uint256 sessionId)
        function getSession(uint256 sessionId) view returns (address user, address host, bytes32 modelId, address token, uint256 depositRemaining, uint256 pricePerToken, uint256 startedAt, uint256 lastCheckpointIndex, uint8 status)
        event SessionCreated(uint256 indexed sessionId, address indexed user, address indexed host)
        event SessionCompleted(uint256 indexed sessionId)
    ]"#
);

abigen!(
    NodeRegistry,
    r#"[
        function getAllNodes() view returns (address[])
        function getNode(address host) view returns (string apiUrl, uint256 stake, uint256 pricePerToken, bool active, string metadataRef)
        function getNodeApiUrl(address host) view returns (string)
        function getSupportedModels(address host) view returns (bytes32[])
        function isNodeRegistered(address host) view returns (bool)
        function registerNodeWithUrl(string url, uint256 stake, bytes32[] modelIds, uint256 pricePerToken)
        function updateApiUrl(string url)
        function updateSupportedModels(bytes32[] modelIds)
        function updateMetadata(string blobRef)
        function addStake(uint256 amount)
        function unstake(uint256 amount)
        function unregisterNode()
        function stakeToken() view returns (address)
        function getAllModels() view returns (bytes32[])
        function getModel(bytes32 modelId) view returns (string repo, string filename, bytes32 contentHash, bool active)
        event NodeRegistered(address indexed host, string url, uint256 stake)
        event NodeUnregistered(address indexed host)
    ]"#
);

abigen!(
    ProofSystem,
    r#"[
        function submitProof(uint256 sessionId, uint256 checkpointIndex, uint256 tokenCount, bytes proofBlob)
        function getProofSubmission(uint256 sessionId, uint256 checkpointIndex) view returns (bytes32 proofHash, uint256 tokenCount, uint256 startToken, uint256 endToken, uint256 submittedAt)
        event ProofSubmitted(uint256 indexed sessionId, uint256 indexed checkpointIndex, bytes32 proofHash)
    ]"#
);

abigen!(
    HostEarnings,
    r#"[
        function getBalance(address host, address token) view returns (uint256)
        function getBalances(address host, address[] tokens) view returns (uint256[])
        function withdrawAll()
        function withdrawMultiple(address[] tokens)
        event Withdrawal(address indexed host, address indexed token, uint256 amount)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function approve(address spender, uint256 amount) returns (bool)
        function allowance(address owner, address spender) view returns (uint256)
        function balanceOf(address owner) view returns (uint256)
        function decimals() view returns (uint8)
    ]"#
);
