//! Call signatures and the dense-ID registry.
//!
//! Every stub and bytecode handler is described by a [`CallSignature`]:
//! its ABI contract plus an optional constructor that emits the body.
//! Signatures are registered once during bring-up into two parallel
//! dense-ID tables (general stubs and bytecode handlers); the IDs are the
//! wire contract between stub generation and the per-thread dispatch
//! tables, so the registry refuses mutation after sealing.

use crate::masm::codebuf::CodeBuffer;

/// Semantic operand types a signature declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Void,
    Bool,
    Int32,
    Int64,
    Float64,
    Tagged,
    TaggedPointer,
    NativePointer,
}

/// What category of code a signature's body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TargetKind {
    CommonStub = 0,
    RuntimeStub,
    RuntimeStubVarargs,
    RuntimeStubNoGc,
    BytecodeHandler,
    BytecodeHelperHandler,
    JsFunction,
}

impl TargetKind {
    pub fn is_bytecode_handler(self) -> bool {
        matches!(
            self,
            TargetKind::BytecodeHandler | TargetKind::BytecodeHelperHandler
        )
    }
}

/// Calling convention of a signature's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CallConv {
    /// Platform C ABI.
    CCall = 0,
    /// Internal fast-dispatch convention with fixed register roles.
    Ghc,
    /// Argument-vector JS convention.
    WebKitJs,
}

/// Emits one stub body into a code buffer.
pub type StubConstructor = fn(&mut CodeBuffer);

/// The ABI contract of one callable stub.
#[derive(Clone)]
pub struct CallSignature {
    name: &'static str,
    params: Vec<VarType>,
    return_type: VarType,
    target_kind: TargetKind,
    call_conv: CallConv,
    variadic: bool,
    constructor: Option<StubConstructor>,
}

impl CallSignature {
    pub fn new(name: &'static str, params: &[VarType], return_type: VarType) -> Self {
        Self {
            name,
            params: params.to_vec(),
            return_type,
            target_kind: TargetKind::CommonStub,
            call_conv: CallConv::CCall,
            variadic: false,
            constructor: None,
        }
    }

    pub fn with_target_kind(mut self, kind: TargetKind) -> Self {
        self.target_kind = kind;
        self
    }

    pub fn with_call_conv(mut self, conv: CallConv) -> Self {
        self.call_conv = conv;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn with_constructor(mut self, ctor: StubConstructor) -> Self {
        self.constructor = Some(ctor);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[VarType] {
        &self.params
    }

    pub fn return_type(&self) -> VarType {
        self.return_type
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn call_conv(&self) -> CallConv {
        self.call_conv
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    pub fn constructor(&self) -> Option<StubConstructor> {
        self.constructor
    }
}

impl std::fmt::Debug for CallSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSignature")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("target_kind", &self.target_kind)
            .field("call_conv", &self.call_conv)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// Two parallel dense-ID tables: general stubs and bytecode handlers.
/// IDs are assigned in registration order and frozen by [`seal`].
///
/// [`seal`]: SignatureRegistry::seal
pub struct SignatureRegistry {
    stubs: Vec<CallSignature>,
    handlers: Vec<CallSignature>,
    sealed: bool,
}

impl SignatureRegistry {
    pub fn new() -> Self {
        Self {
            stubs: Vec::new(),
            handlers: Vec::new(),
            sealed: false,
        }
    }

    /// Register a stub signature, returning its dense ID.
    pub fn register_stub(&mut self, sig: CallSignature) -> usize {
        assert!(!self.sealed, "signature registry is sealed");
        assert!(
            !sig.target_kind().is_bytecode_handler(),
            "bytecode handlers go in the handler table"
        );
        let id = self.stubs.len();
        self.stubs.push(sig);
        id
    }

    /// Register a bytecode-handler signature, returning its dense ID.
    pub fn register_handler(&mut self, sig: CallSignature) -> usize {
        assert!(!self.sealed, "signature registry is sealed");
        assert!(
            sig.target_kind().is_bytecode_handler(),
            "stub signatures go in the stub table"
        );
        let id = self.handlers.len();
        self.handlers.push(sig);
        id
    }

    /// Freeze the ID space. Registration afterwards is a bug.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn stub(&self, id: usize) -> &CallSignature {
        &self.stubs[id]
    }

    pub fn handler(&self, id: usize) -> &CallSignature {
        &self.handlers[id]
    }

    pub fn stubs(&self) -> &[CallSignature] {
        &self.stubs
    }

    pub fn handlers(&self) -> &[CallSignature] {
        &self.handlers
    }

    pub fn stub_id_by_name(&self, name: &str) -> Option<usize> {
        self.stubs.iter().position(|s| s.name() == name)
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}
