//! Concrete token schemas for every frame role.
//!
//! - [`context_request`] / [`context_response`]: connection handshake.
//! - [`request`]: per-operation request metadata.
//! - [`response`]: per-operation response metadata.
//!
//! Tables must stay sorted by id; lookups binary-search them.

use super::schema::token_schema;

token_schema! {
    /// Client → server handshake metadata.
    pub mod context_request("context-request") {
        PROTOCOL_VERSION = 0x0000, ULong32, required, None;
        CLIENT_VERSION = 0x0001, SmallString, required, None;
        USER_AGENT = 0x0002, SmallString, required, None;
    }
}

token_schema! {
    /// Server → client handshake metadata.
    ///
    /// On a rejected handshake the server echoes the protocol and client
    /// versions it requires in the first two tokens.
    pub mod context_response("context-response") {
        PROTOCOL_VERSION = 0x0000, ULong32, optional, None;
        CLIENT_VERSION = 0x0001, SmallString, optional, None;
        SERVER_AGENT = 0x1000, SmallString, required, None;
        SERVER_VERSION = 0x1001, SmallString, required, None;
        IDLE_TIMEOUT_IN_SECONDS = 0x1002, ULong32, optional, None;
        UNAUTHENTICATED_TIMEOUT_IN_SECONDS = 0x1003, ULong32, optional, None;
    }
}

token_schema! {
    /// Per-operation request metadata.
    pub mod request("request") {
        RESOURCE_ID = 0x0000, Bytes, optional, None;
        AUTHORIZATION_TOKEN = 0x0001, String, optional, Some("authorization");
        PAYLOAD_PRESENT = 0x0002, Byte, required, None;
        DATE = 0x0003, SmallString, optional, Some("x-ms-date");
        PAGE_SIZE = 0x0004, ULong32, optional, Some("x-ms-max-item-count");
        SESSION_TOKEN = 0x0005, String, optional, Some("x-ms-session-token");
        CONTINUATION_TOKEN = 0x0006, String, optional, Some("x-ms-continuation");
        INDEXING_DIRECTIVE = 0x0007, Byte, optional, Some("x-ms-indexing-directive");
        MATCH = 0x0008, String, optional, Some("if-match");
        PRE_TRIGGER_INCLUDE = 0x0009, String, optional, Some("x-ms-documentdb-pre-trigger-include");
        POST_TRIGGER_INCLUDE = 0x000A, String, optional, Some("x-ms-documentdb-post-trigger-include");
        IS_FANOUT = 0x000B, Byte, optional, Some("x-ms-is-fanout-request");
        COLLECTION_PARTITION_INDEX = 0x000C, ULong32, optional, Some("collection-partition-index");
        COLLECTION_SERVICE_INDEX = 0x000D, ULong32, optional, Some("collection-service-index");
        PRE_TRIGGER_EXCLUDE = 0x000E, String, optional, Some("x-ms-documentdb-pre-trigger-exclude");
        POST_TRIGGER_EXCLUDE = 0x000F, String, optional, Some("x-ms-documentdb-post-trigger-exclude");
        CONSISTENCY_LEVEL = 0x0010, Byte, optional, Some("x-ms-consistency-level");
        ENTITY_ID = 0x0011, String, optional, Some("x-docdb-entity-id");
        RESOURCE_SCHEMA_NAME = 0x0012, SmallString, optional, Some("x-ms-resource-schema-name");
        REPLICA_PATH = 0x0013, String, optional, None;
        RESOURCE_TOKEN_EXPIRY = 0x0014, ULong32, optional, Some("x-ms-documentdb-expiry-seconds");
        DATABASE_NAME = 0x0015, String, optional, None;
        COLLECTION_NAME = 0x0016, String, optional, None;
        DOCUMENT_NAME = 0x0017, String, optional, None;
        ATTACHMENT_NAME = 0x0018, String, optional, None;
        USER_NAME = 0x0019, String, optional, None;
        PERMISSION_NAME = 0x001A, String, optional, None;
        STORED_PROCEDURE_NAME = 0x001B, String, optional, None;
        USER_DEFINED_FUNCTION_NAME = 0x001C, String, optional, None;
        TRIGGER_NAME = 0x001D, String, optional, None;
        ENABLE_SCAN_IN_QUERY = 0x001E, Byte, optional, Some("x-ms-documentdb-query-enable-scan");
        EMIT_VERBOSE_TRACES_IN_QUERY = 0x001F, Byte, optional, Some("x-ms-documentdb-query-emit-traces");
        CONFLICT_NAME = 0x0020, String, optional, None;
        BIND_REPLICA_DIRECTIVE = 0x0021, String, optional, Some("x-ms-bind-replica");
        PRIMARY_MASTER_KEY = 0x0022, String, optional, None;
        SECONDARY_MASTER_KEY = 0x0023, String, optional, None;
        PRIMARY_READONLY_KEY = 0x0024, String, optional, None;
        SECONDARY_READONLY_KEY = 0x0025, String, optional, None;
        PROFILE_REQUEST = 0x0026, Byte, optional, Some("x-ms-profile-request");
        ENABLE_LOW_PRECISION_ORDER_BY = 0x0027, Byte, optional, Some("x-ms-documentdb-query-enable-low-precision-order-by");
        CLIENT_VERSION = 0x0028, SmallString, optional, Some("x-ms-version");
        CAN_CHARGE = 0x0029, Byte, optional, Some("x-ms-cancharge");
        CAN_THROTTLE = 0x002A, Byte, optional, Some("x-ms-canthrottle");
        PARTITION_KEY = 0x002B, String, optional, Some("x-ms-documentdb-partitionkey");
        PARTITION_KEY_RANGE_ID = 0x002C, String, optional, Some("x-ms-documentdb-partitionkeyrangeid");
        NOT_USED_2D = 0x002D, String, optional, None;
        NOT_USED_2E = 0x002E, String, optional, None;
        NOT_USED_2F = 0x002F, String, optional, None;
        MIGRATE_COLLECTION_DIRECTIVE = 0x0031, Byte, optional, Some("x-ms-migratecollection-directive");
        SUPPORT_SPATIAL_LEGACY_COORDINATES = 0x0033, Byte, optional, Some("x-ms-documentdb-supportspatiallegacycoordinates");
        PARTITION_COUNT = 0x0034, ULong32, optional, Some("x-ms-documentdb-partitioncount");
        COLLECTION_RID = 0x0035, String, optional, Some("x-ms-documentdb-collection-rid");
        PARTITION_KEY_RANGE_NAME = 0x0036, String, optional, None;
        SCHEMA_NAME = 0x003A, String, optional, None;
        FILTER_BY_SCHEMA_RID = 0x003B, String, optional, Some("x-ms-documentdb-filterby-schema-rid");
        USE_POLYGONS_SMALLER_THAN_A_HEMISPHERE = 0x003C, Byte, optional, Some("x-ms-documentdb-usepolygonssmallerthanahemisphere");
        GATEWAY_SIGNATURE = 0x003D, String, optional, Some("x-ms-gateway-signature");
        ENABLE_LOGGING = 0x003E, Byte, optional, Some("x-ms-documentdb-script-enable-logging");
        A_IM = 0x003F, String, optional, Some("a-im");
        POPULATE_QUOTA_INFO = 0x0040, Byte, optional, Some("x-ms-documentdb-populatequotainfo");
        DISABLE_RU_PER_MINUTE_USAGE = 0x0041, Byte, optional, Some("x-ms-documentdb-disable-ru-per-minute-usage");
        POPULATE_QUERY_METRICS = 0x0042, Byte, optional, Some("x-ms-documentdb-populatequerymetrics");
        RESPONSE_CONTINUATION_TOKEN_LIMIT_IN_KB = 0x0043, ULong32, optional, Some("x-ms-documentdb-responsecontinuationtokenlimitinkb");
        POPULATE_PARTITION_STATISTICS = 0x0044, Byte, optional, Some("x-ms-documentdb-populatepartitionstatistics");
        REMOTE_STORAGE_TYPE = 0x0045, Byte, optional, Some("x-ms-remote-storage-type");
        COLLECTION_REMOTE_STORAGE_SECURITY_IDENTIFIER = 0x0046, String, optional, Some("x-ms-collection-security-identifier");
        IF_MODIFIED_SINCE = 0x0047, String, optional, Some("if-modified-since");
        POPULATE_COLLECTION_THROUGHPUT_INFO = 0x0048, Byte, optional, Some("x-ms-documentdb-populatecollectionthroughputinfo");
        REMAINING_TIME_IN_MS_ON_CLIENT_REQUEST = 0x0049, ULong32, optional, Some("x-ms-remaining-time-in-ms-on-client");
        CLIENT_RETRY_ATTEMPT_COUNT = 0x004A, ULong32, optional, Some("x-ms-client-retry-attempt-count");
        TARGET_LSN = 0x004B, LongLong64, optional, Some("x-ms-target-lsn");
        TARGET_GLOBAL_COMMITTED_LSN = 0x004C, LongLong64, optional, Some("x-ms-target-global-committed-lsn");
        RESTORE_METADATA_FILTER = 0x004E, String, optional, Some("x-ms-restore-metadata-filter");
        RESTORE_PARAMS = 0x004F, String, optional, Some("x-ms-restore-params");
        SHARE_THROUGHPUT = 0x0050, Byte, optional, Some("x-ms-share-throughput");
        PARTITION_RESOURCE_FILTER = 0x0051, String, optional, Some("x-ms-documentdb-partitionresourcefilter");
        IS_READ_ONLY_SCRIPT = 0x0052, Byte, optional, Some("x-ms-is-readonly-script");
        IS_AUTO_SCALE_REQUEST = 0x0053, Byte, optional, Some("x-ms-is-auto-scale");
        FORCE_QUERY_SCAN = 0x0054, Byte, optional, Some("x-ms-documentdb-force-query-scan");
        CAN_OFFER_REPLACE_COMPLETE = 0x0056, Byte, optional, Some("x-ms-can-offer-replace-complete");
        EXCLUDE_SYSTEM_PROPERTIES = 0x0057, Byte, optional, Some("x-ms-exclude-system-properties");
        IS_USER_REQUEST = 0x0058, Byte, optional, Some("x-ms-is-user-request");
        PRESERVE_FULL_CONTENT = 0x0059, Byte, optional, Some("x-ms-cosmos-preserve-full-content");
        EFFECTIVE_PARTITION_KEY = 0x005A, Bytes, optional, None;
        MERGE_STATIC_ID = 0x005B, String, optional, Some("x-ms-cosmos-merge-static-id");
        IS_BATCH_ATOMIC = 0x005C, Byte, optional, Some("x-ms-cosmos-batch-atomic");
        SHOULD_BATCH_CONTINUE_ON_ERROR = 0x005D, Byte, optional, Some("x-ms-cosmos-batch-continue-on-error");
        IS_BATCH_ORDERED = 0x005E, Byte, optional, Some("x-ms-cosmos-batch-ordered");
        SDK_SUPPORTED_CAPABILITIES = 0x0066, ULong32, optional, Some("x-ms-cosmos-sdk-supportedcapabilities");
        CORRELATED_ACTIVITY_ID = 0x0069, String, optional, Some("x-ms-cosmos-correlated-activityid");
        TRANSPORT_REQUEST_ID = 0x0073, ULong32, optional, None;
    }
}

token_schema! {
    /// Per-operation response metadata.
    pub mod response("response") {
        PAYLOAD_PRESENT = 0x0000, Byte, required, None;
        LAST_STATE_CHANGE_DATE_TIME = 0x0002, SmallString, optional, Some("x-ms-last-state-change-utc");
        CONTINUATION_TOKEN = 0x0003, String, optional, Some("x-ms-continuation");
        ETAG = 0x0004, String, optional, Some("etag");
        READS_PERFORMED = 0x0007, ULong32, optional, Some("x-ms-reads-performed");
        WRITES_PERFORMED = 0x0008, ULong32, optional, Some("x-ms-writes-performed");
        QUERIES_PERFORMED = 0x0009, ULong32, optional, Some("x-ms-queries-performed");
        INDEX_TERMS_GENERATED = 0x000A, ULong32, optional, Some("x-ms-index-terms-generated");
        SCRIPTS_EXECUTED = 0x000B, ULong32, optional, Some("x-ms-scripts-executed");
        RETRY_AFTER_MILLISECONDS = 0x000C, ULong32, optional, Some("x-ms-retry-after-ms");
        INDEXING_DIRECTIVE = 0x000D, Byte, optional, Some("x-ms-indexing-directive");
        STORAGE_MAX_RESOURCE_QUOTA = 0x000E, String, optional, Some("x-ms-resource-quota");
        STORAGE_RESOURCE_QUOTA_USAGE = 0x000F, String, optional, Some("x-ms-resource-usage");
        SCHEMA_VERSION = 0x0010, SmallString, optional, Some("x-ms-schemaversion");
        COLLECTION_PARTITION_INDEX = 0x0011, ULong32, optional, Some("collection-partition-index");
        COLLECTION_SERVICE_INDEX = 0x0012, ULong32, optional, Some("collection-service-index");
        LSN = 0x0013, LongLong64, optional, Some("lsn");
        ITEM_COUNT = 0x0014, ULong32, optional, Some("x-ms-item-count");
        REQUEST_CHARGE = 0x0015, Double64, optional, Some("x-ms-request-charge");
        OWNER_FULL_NAME = 0x0017, String, optional, Some("x-ms-alt-content-path");
        OWNER_ID = 0x0018, String, optional, Some("x-ms-content-path");
        DATABASE_ACCOUNT_ID = 0x0019, String, optional, Some("x-ms-database-account-id");
        QUORUM_ACKED_LSN = 0x001A, LongLong64, optional, Some("x-ms-quorum-acked-lsn");
        REQUEST_VALIDATION_FAILURE = 0x001B, Byte, optional, Some("x-ms-request-validation-failure");
        SUB_STATUS = 0x001C, ULong32, optional, Some("x-ms-substatus");
        COLLECTION_UPDATE_PROGRESS = 0x001D, ULong32, optional, Some("x-ms-documentdb-collection-index-transformation-progress");
        CURRENT_WRITE_QUORUM = 0x001E, ULong32, optional, Some("x-ms-current-write-quorum");
        CURRENT_REPLICA_SET_SIZE = 0x001F, ULong32, optional, Some("x-ms-current-replica-set-size");
        COLLECTION_LAZY_INDEX_PROGRESS = 0x0020, ULong32, optional, Some("x-ms-documentdb-collection-lazy-indexing-progress");
        PARTITION_KEY_RANGE_ID = 0x0021, String, optional, Some("x-ms-documentdb-partitionkeyrangeid");
        LOG_RESULTS = 0x0025, String, optional, Some("x-ms-documentdb-script-log-results");
        XP_ROLE = 0x0026, ULong32, optional, Some("x-ms-xp-role");
        IS_RU_PER_MINUTE_USED = 0x0027, Byte, optional, Some("x-ms-documentdb-is-ru-per-minute-used");
        QUERY_METRICS = 0x0028, String, optional, Some("x-ms-documentdb-query-metrics");
        GLOBAL_COMMITTED_LSN = 0x0029, LongLong64, optional, Some("x-ms-global-committed-lsn");
        NUMBER_OF_READ_REGIONS = 0x0030, ULong32, optional, Some("x-ms-number-of-read-regions");
        OFFER_REPLACE_PENDING = 0x0031, Byte, optional, Some("x-ms-offer-replace-pending");
        ITEM_LSN = 0x0032, LongLong64, optional, Some("x-ms-item-lsn");
        RESTORE_STATE = 0x0033, String, optional, Some("x-ms-restore-state");
        COLLECTION_SECURITY_IDENTIFIER = 0x0034, String, optional, Some("x-ms-collection-security-identifier");
        TRANSPORT_REQUEST_ID = 0x0035, ULong32, optional, None;
        SHARE_THROUGHPUT = 0x0036, Byte, optional, Some("x-ms-share-throughput");
        DISABLE_RNTBD_CHANNEL = 0x0038, Byte, optional, Some("x-ms-disable-rntbd-channel");
        SERVER_DATE_TIME_UTC = 0x0039, SmallString, optional, Some("x-ms-date");
        LOCAL_LSN = 0x003A, LongLong64, optional, Some("x-ms-cosmos-llsn");
        QUORUM_ACKED_LOCAL_LSN = 0x003B, LongLong64, optional, Some("x-ms-cosmos-quorum-acked-llsn");
        ITEM_LOCAL_LSN = 0x003C, LongLong64, optional, Some("x-ms-cosmos-item-llsn");
        HAS_TENTATIVE_WRITES = 0x003D, Byte, optional, Some("x-ms-cosmosdb-has-tentative-writes");
        SESSION_TOKEN = 0x003E, String, optional, Some("x-ms-session-token");
        REPLICA_STATUS_REVOKED = 0x003F, Byte, optional, Some("x-ms-cosmos-replica-status-revoked");
        CORRELATED_ACTIVITY_ID = 0x0040, String, optional, Some("x-ms-cosmos-correlated-activityid");
    }
}
