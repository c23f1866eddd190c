//! Attribute keys and well-known values recorded on pipeline spans.

pub const FAAS_TRIGGER: &str = "faas.trigger";
pub const FAAS_TRIGGER_HTTP: &str = "http";
pub const FAAS_TRIGGER_PUBSUB: &str = "pubsub";
pub const FAAS_TRIGGER_DATASOURCE: &str = "datasource";
pub const FAAS_TRIGGER_TIMER: &str = "timer";
pub const FAAS_TIME: &str = "faas.time";

pub const FAAS_DOCUMENT_OPERATION: &str = "faas.document.operation";
pub const FAAS_DOCUMENT_OPERATION_INSERT: &str = "insert";
pub const FAAS_DOCUMENT_TIME: &str = "faas.document.time";
pub const FAAS_DOCUMENT_COLLECTION: &str = "faas.document.collection";
pub const FAAS_DOCUMENT_NAME: &str = "faas.document.name";

pub const NET_TRANSPORT: &str = "net.transport";
pub const NET_TRANSPORT_TCP: &str = "ip_tcp";
pub const NET_HOST_NAME: &str = "net.host.name";

pub const HTTP_METHOD: &str = "http.method";
pub const HTTP_ROUTE: &str = "http.route";
pub const HTTP_TARGET: &str = "http.target";
pub const HTTP_SCHEME: &str = "http.scheme";
pub const HTTP_USER_AGENT: &str = "http.user_agent";
pub const HTTP_STATUS_CODE: &str = "http.status_code";

pub const MESSAGING_SYSTEM: &str = "messaging.system";
pub const MESSAGING_SYSTEM_SQS: &str = "AmazonSQS";
pub const MESSAGING_OPERATION: &str = "messaging.operation";
pub const MESSAGING_OPERATION_PROCESS: &str = "process";
pub const MESSAGING_OPERATION_PUBLISH: &str = "publish";
pub const MESSAGING_DESTINATION_KIND: &str = "messaging.destination.kind";
pub const MESSAGING_DESTINATION_KIND_QUEUE: &str = "queue";
pub const MESSAGING_DESTINATION_NAME: &str = "messaging.destination.name";
pub const MESSAGING_MESSAGE_ID: &str = "messaging.message_id";
pub const AWS_QUEUE_URL: &str = "aws.queue_url";

pub const AWS_S3_BUCKET: &str = "aws.s3.bucket";
pub const AWS_S3_KEY: &str = "aws.s3.key";
pub const AWS_REQUEST_ID: &str = "aws.request.id";

pub const EXCEPTION_EVENT: &str = "exception";
pub const EXCEPTION_TYPE: &str = "exception.type";
pub const EXCEPTION_MESSAGE: &str = "exception.message";
pub const EXCEPTION_ESCAPED: &str = "exception.escaped";

// Pipeline-specific attributes
pub const IS_SUCCESSFUL: &str = "is.successful";
pub const BUCKET_ID: &str = "bucket.id";
pub const KEY_NAME: &str = "key.name";
pub const CORRELATION_ID: &str = "correlation.id";
pub const FAULT_INJECTED: &str = "fault.injected";
pub const OBJECTS_DELETED: &str = "objects.deleted";
pub const OBJECT_OUT_OF_ORDER: &str = "object.out_of_order";

// Client span names
pub const S3_GET_OBJECT: &str = "S3.GetObject";
pub const S3_PUT_OBJECT: &str = "S3.PutObject";
pub const S3_DELETE_OBJECTS: &str = "S3.DeleteObjects";
pub const SQS_SEND_MESSAGE: &str = "SQS.SendMessage";
