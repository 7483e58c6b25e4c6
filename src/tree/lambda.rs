use crate::record::StackFrame;

const LAMBDA_FORM_PREFIX: &str = "java.lang.invoke.LambdaForm$";
const METHOD_HANDLE_HOLDER_PREFIX: &str = "java.lang.invoke.DirectMethodHandle$Holder";
const LAMBDA_CLASS_MARKER: &str = "$$Lambda";
const LAMBDA_METHOD_PREFIX: &str = "lambda$";

/// Label given to every frame recognized by [`is_lambda_infrastructure`].
pub const LAMBDA_FRAME_LABEL: &str = "Lambda Frame (Synthetic)";

/// Whether the frame belongs to the machinery the JVM uses to implement lambdas and method
/// handles rather than to user code.
///
/// Matches `LambdaForm$*` and `DirectMethodHandle$Holder*` classes, runtime-generated
/// `$$Lambda` classes (whatever their suffix), and compiler-generated `lambda$*` bodies.
/// Plain nested classes, `MethodHandle` itself and methods that merely mention "lambda" are
/// left alone.
pub fn is_lambda_infrastructure(frame: &StackFrame) -> bool {
    let class = frame.class_name.as_str();
    class.starts_with(LAMBDA_FORM_PREFIX)
        || class.starts_with(METHOD_HANDLE_HOLDER_PREFIX)
        || class.contains(LAMBDA_CLASS_MARKER)
        || frame.method_name.starts_with(LAMBDA_METHOD_PREFIX)
}
