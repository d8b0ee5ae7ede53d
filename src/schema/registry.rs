//! Explicit resource schema registry.
//!
//! The registry is populated at startup from a built-in table of AWS
//! resource types and, optionally, from schema files that add or override
//! entries. Schema files are JSON or YAML:
//!
//! ```yaml
//! AWS::EC2::Instance:
//!   properties:
//!     ImageId:
//!       update_causes: replacement
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ConfigError, Result, StackPlanError};
use crate::template::Expression;

use super::provider::{
    ConditionalCause, PropertyDescriptor, ResourceSchema, ResourceSchemaProvider, UpdateCause,
};

use UpdateCause::{Interrupt, None as NoEffect, Replacement, Unavailable, Unknown};

const EC2_INSTANCE: &[(&str, UpdateCause)] = &[
    ("AdditionalInfo", Interrupt),
    ("AvailabilityZone", Replacement),
    ("BlockDeviceMappings", Replacement),
    ("DisableApiTermination", NoEffect),
    ("EbsOptimized", Interrupt),
    ("IamInstanceProfile", Replacement),
    ("ImageId", Replacement),
    ("InstanceInitiatedShutdownBehavior", NoEffect),
    ("InstanceType", Interrupt),
    ("KernelId", Interrupt),
    ("KeyName", Replacement),
    ("Monitoring", NoEffect),
    ("NetworkInterfaces", Replacement),
    ("PlacementGroupName", Replacement),
    ("PrivateIpAddress", Replacement),
    ("RamdiskId", Interrupt),
    ("SecurityGroupIds", NoEffect),
    ("SecurityGroups", Replacement),
    ("SourceDestCheck", NoEffect),
    ("SubnetId", Replacement),
    ("Tags", NoEffect),
    ("Tenancy", Replacement),
    ("UserData", Interrupt),
    ("Volumes", NoEffect),
];

const EC2_SECURITY_GROUP: &[(&str, UpdateCause)] = &[
    ("GroupDescription", Replacement),
    ("GroupName", Replacement),
    ("SecurityGroupEgress", NoEffect),
    ("SecurityGroupIngress", NoEffect),
    ("Tags", NoEffect),
    ("VpcId", Replacement),
];

const EC2_EIP: &[(&str, UpdateCause)] = &[
    ("Domain", Replacement),
    ("InstanceId", NoEffect),
    ("Tags", NoEffect),
];

const AUTOSCALING_GROUP: &[(&str, UpdateCause)] = &[
    ("AutoScalingGroupName", Replacement),
    ("AvailabilityZones", NoEffect),
    ("Cooldown", NoEffect),
    ("DesiredCapacity", NoEffect),
    ("HealthCheckGracePeriod", NoEffect),
    ("HealthCheckType", NoEffect),
    ("InstanceId", Replacement),
    ("LaunchConfigurationName", NoEffect),
    ("LaunchTemplate", NoEffect),
    ("LoadBalancerNames", Replacement),
    ("MaxSize", NoEffect),
    ("MetricsCollection", NoEffect),
    ("MinSize", NoEffect),
    ("NotificationConfigurations", NoEffect),
    ("PlacementGroup", NoEffect),
    ("Tags", NoEffect),
    ("TargetGroupARNs", NoEffect),
    ("TerminationPolicies", NoEffect),
    ("VPCZoneIdentifier", NoEffect),
];

const AUTOSCALING_LAUNCH_CONFIGURATION: &[(&str, UpdateCause)] = &[
    ("AssociatePublicIpAddress", Replacement),
    ("BlockDeviceMappings", Replacement),
    ("EbsOptimized", Replacement),
    ("IamInstanceProfile", Replacement),
    ("ImageId", Replacement),
    ("InstanceId", Replacement),
    ("InstanceMonitoring", Replacement),
    ("InstanceType", Replacement),
    ("KernelId", Replacement),
    ("KeyName", Replacement),
    ("LaunchConfigurationName", Replacement),
    ("PlacementTenancy", Replacement),
    ("RamDiskId", Replacement),
    ("SecurityGroups", Replacement),
    ("SpotPrice", Replacement),
    ("UserData", Replacement),
];

const ELB_LOAD_BALANCER: &[(&str, UpdateCause)] = &[
    ("AccessLoggingPolicy", NoEffect),
    ("AppCookieStickinessPolicy", NoEffect),
    ("AvailabilityZones", NoEffect),
    ("ConnectionDrainingPolicy", NoEffect),
    ("ConnectionSettings", NoEffect),
    ("CrossZone", NoEffect),
    ("HealthCheck", NoEffect),
    ("Instances", NoEffect),
    ("LBCookieStickinessPolicy", NoEffect),
    ("Listeners", NoEffect),
    ("LoadBalancerName", Replacement),
    ("Policies", NoEffect),
    ("Scheme", Replacement),
    ("SecurityGroups", NoEffect),
    ("Subnets", NoEffect),
    ("Tags", NoEffect),
];

const RDS_DB_INSTANCE: &[(&str, UpdateCause)] = &[
    ("AllowMajorVersionUpgrade", NoEffect),
    ("AutoMinorVersionUpgrade", NoEffect),
    ("AvailabilityZone", Replacement),
    ("BackupRetentionPeriod", Interrupt),
    ("CharacterSetName", Replacement),
    ("DBInstanceClass", Interrupt),
    ("DBInstanceIdentifier", Replacement),
    ("DBName", Replacement),
    ("DBParameterGroupName", Interrupt),
    ("DBSecurityGroups", NoEffect),
    ("DBSnapshotIdentifier", Replacement),
    ("DBSubnetGroupName", Replacement),
    ("Engine", Replacement),
    ("EngineVersion", Interrupt),
    ("Iops", NoEffect),
    ("KmsKeyId", Replacement),
    ("LicenseModel", Replacement),
    ("MasterUserPassword", NoEffect),
    ("MasterUsername", Replacement),
    ("MultiAZ", NoEffect),
    ("OptionGroupName", NoEffect),
    ("Port", Replacement),
    ("PreferredBackupWindow", NoEffect),
    ("PreferredMaintenanceWindow", NoEffect),
    ("PubliclyAccessible", Replacement),
    ("SourceDBInstanceIdentifier", Replacement),
    ("StorageEncrypted", Replacement),
    ("StorageType", Unavailable),
    ("Tags", NoEffect),
    ("VPCSecurityGroups", NoEffect),
];

const DYNAMODB_TABLE: &[(&str, UpdateCause)] = &[
    ("AttributeDefinitions", NoEffect),
    ("BillingMode", NoEffect),
    ("KeySchema", Replacement),
    ("LocalSecondaryIndexes", Replacement),
    ("ProvisionedThroughput", NoEffect),
    ("StreamSpecification", NoEffect),
    ("TableName", Replacement),
    ("Tags", NoEffect),
];

const S3_BUCKET: &[(&str, UpdateCause)] = &[
    ("AccessControl", NoEffect),
    ("BucketName", Replacement),
    ("CorsConfiguration", NoEffect),
    ("LifecycleConfiguration", NoEffect),
    ("LoggingConfiguration", NoEffect),
    ("NotificationConfiguration", NoEffect),
    ("ReplicationConfiguration", NoEffect),
    ("Tags", NoEffect),
    ("VersioningConfiguration", NoEffect),
    ("WebsiteConfiguration", NoEffect),
];

const IAM_ROLE: &[(&str, UpdateCause)] = &[
    ("AssumeRolePolicyDocument", NoEffect),
    ("ManagedPolicyArns", NoEffect),
    ("MaxSessionDuration", NoEffect),
    ("Path", Replacement),
    ("Policies", NoEffect),
    ("RoleName", Replacement),
    ("Tags", NoEffect),
];

const SNS_TOPIC: &[(&str, UpdateCause)] = &[
    ("DisplayName", NoEffect),
    ("Subscription", NoEffect),
    ("Tags", NoEffect),
    ("TopicName", Replacement),
];

const SQS_QUEUE: &[(&str, UpdateCause)] = &[
    ("DelaySeconds", NoEffect),
    ("FifoQueue", Replacement),
    ("MaximumMessageSize", NoEffect),
    ("MessageRetentionPeriod", NoEffect),
    ("QueueName", Replacement),
    ("ReceiveMessageWaitTimeSeconds", NoEffect),
    ("RedrivePolicy", NoEffect),
    ("Tags", NoEffect),
    ("VisibilityTimeout", NoEffect),
];

const LAMBDA_FUNCTION: &[(&str, UpdateCause)] = &[
    ("Code", NoEffect),
    ("DeadLetterConfig", NoEffect),
    ("Description", NoEffect),
    ("Environment", NoEffect),
    ("FunctionName", Replacement),
    ("Handler", NoEffect),
    ("KmsKeyArn", NoEffect),
    ("MemorySize", NoEffect),
    ("Role", NoEffect),
    ("Runtime", NoEffect),
    ("Tags", NoEffect),
    ("Timeout", NoEffect),
    ("VpcConfig", NoEffect),
];

const ROUTE53_RECORD_SET: &[(&str, UpdateCause)] = &[
    ("AliasTarget", NoEffect),
    ("Comment", NoEffect),
    ("HostedZoneId", Replacement),
    ("HostedZoneName", Replacement),
    ("Name", Replacement),
    ("ResourceRecords", NoEffect),
    ("SetIdentifier", NoEffect),
    ("TTL", NoEffect),
    ("Type", NoEffect),
    ("Weight", NoEffect),
];

const ELASTICACHE_CLUSTER: &[(&str, UpdateCause)] = &[
    ("AutoMinorVersionUpgrade", NoEffect),
    ("CacheNodeType", Interrupt),
    ("CacheParameterGroupName", NoEffect),
    ("CacheSubnetGroupName", Replacement),
    ("ClusterName", Replacement),
    ("Engine", Replacement),
    ("EngineVersion", Interrupt),
    ("NumCacheNodes", NoEffect),
    ("Port", Replacement),
    ("PreferredMaintenanceWindow", NoEffect),
    ("VpcSecurityGroupIds", NoEffect),
];

const CLOUDFORMATION_STACK: &[(&str, UpdateCause)] = &[
    ("NotificationARNs", NoEffect),
    // Depends on the resources of the nested stack
    ("Parameters", Unknown),
    ("Tags", NoEffect),
    ("TemplateURL", Unknown),
    ("TimeoutInMinutes", NoEffect),
];

const BUILTIN_TABLES: &[(&str, &[(&str, UpdateCause)])] = &[
    ("AWS::AutoScaling::AutoScalingGroup", AUTOSCALING_GROUP),
    ("AWS::AutoScaling::LaunchConfiguration", AUTOSCALING_LAUNCH_CONFIGURATION),
    ("AWS::CloudFormation::Stack", CLOUDFORMATION_STACK),
    ("AWS::DynamoDB::Table", DYNAMODB_TABLE),
    ("AWS::EC2::EIP", EC2_EIP),
    ("AWS::EC2::Instance", EC2_INSTANCE),
    ("AWS::EC2::SecurityGroup", EC2_SECURITY_GROUP),
    ("AWS::ElastiCache::CacheCluster", ELASTICACHE_CLUSTER),
    ("AWS::ElasticLoadBalancing::LoadBalancer", ELB_LOAD_BALANCER),
    ("AWS::IAM::Role", IAM_ROLE),
    ("AWS::Lambda::Function", LAMBDA_FUNCTION),
    ("AWS::RDS::DBInstance", RDS_DB_INSTANCE),
    ("AWS::Route53::RecordSet", ROUTE53_RECORD_SET),
    ("AWS::S3::Bucket", S3_BUCKET),
    ("AWS::SNS::Topic", SNS_TOPIC),
    ("AWS::SQS::Queue", SQS_QUEUE),
];

/// Schema file entry for one resource type.
#[derive(Debug, Deserialize)]
struct SchemaFileEntry {
    #[serde(default)]
    properties: BTreeMap<String, SchemaFileProperty>,
}

/// Schema file entry for one property.
#[derive(Debug, Deserialize)]
struct SchemaFileProperty {
    update_causes: UpdateCause,
}

/// Registry of resource schemas keyed by type name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    /// Schemas by resource type.
    schemas: HashMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in AWS schemas.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (resource_type, table) in BUILTIN_TABLES {
            registry.register(ResourceSchema::from_table(resource_type, table));
        }
        registry.register_conditionals();
        debug!("Loaded {} built-in resource schemas", registry.len());
        registry
    }

    /// Registers a schema, merging over any existing entry for the type.
    pub fn register(&mut self, schema: ResourceSchema) {
        match self.schemas.get_mut(&schema.resource_type) {
            Some(existing) => existing.merge(schema),
            None => {
                self.schemas.insert(schema.resource_type.clone(), schema);
            }
        }
    }

    /// Loads additional schemas from a JSON or YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        info!("Loading resource schemas from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackPlanError::Config(ConfigError::ParseError {
                message: format!("Failed to read schema file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        let entries: BTreeMap<String, SchemaFileEntry> = serde_yaml::from_str(&content)
            .map_err(|e| {
                StackPlanError::Config(ConfigError::ParseError {
                    message: format!("Schema parse error: {e}"),
                    location: Some(path.display().to_string()),
                })
            })?;

        let count = entries.len();
        for (resource_type, entry) in entries {
            let mut schema = ResourceSchema::new(&resource_type);
            for (name, property) in entry.properties {
                schema.insert(PropertyDescriptor::always(name, property.update_causes));
            }
            self.register(schema);
        }

        debug!("Registered {count} resource schemas from {}", path.display());
        Ok(count)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Properties whose cause depends on both definitions.
    fn register_conditionals(&mut self) {
        let mut rds = ResourceSchema::new("AWS::RDS::DBInstance");
        rds.insert(PropertyDescriptor::conditional(
            "AllocatedStorage",
            vec![
                ConditionalCause {
                    cause: Unavailable,
                    applies: uses_magnetic_storage,
                },
                ConditionalCause {
                    cause: NoEffect,
                    applies: |_, _| true,
                },
            ],
        ));
        self.register(rds);

        let mut dynamo = ResourceSchema::new("AWS::DynamoDB::Table");
        dynamo.insert(PropertyDescriptor::conditional(
            "GlobalSecondaryIndexes",
            vec![
                ConditionalCause {
                    cause: Unavailable,
                    applies: index_key_schemas_differ,
                },
                ConditionalCause {
                    cause: NoEffect,
                    applies: |_, _| true,
                },
            ],
        ));
        self.register(dynamo);
    }
}

impl ResourceSchemaProvider for SchemaRegistry {
    fn lookup(&self, resource_type: &str) -> Result<Option<&ResourceSchema>> {
        Ok(self.schemas.get(resource_type))
    }

    fn provider_name(&self) -> &'static str {
        "registry"
    }
}

fn storage_type(resource: &Expression) -> Option<&str> {
    resource
        .get_path(&["Properties", "StorageType"])
        .and_then(Expression::as_str)
}

/// Magnetic volumes go offline while storage is resized.
fn uses_magnetic_storage(proposed: &Expression, origin: &Expression) -> bool {
    storage_type(proposed) == Some("standard") || storage_type(origin) == Some("standard")
}

fn index_key_schemas(resource: &Expression) -> BTreeMap<String, Expression> {
    let Some(Expression::List(indexes)) = resource.get_path(&["Properties", "GlobalSecondaryIndexes"])
    else {
        return BTreeMap::new();
    };
    indexes
        .iter()
        .filter_map(|index| {
            let name = index.get_path(&["IndexName"])?.scalar_string()?;
            let key_schema = index.get_path(&["KeySchema"]).cloned().unwrap_or(Expression::Null);
            Some((name, key_schema))
        })
        .collect()
}

/// Adding, removing or re-keying an index blocks further updates until it is built.
fn index_key_schemas_differ(proposed: &Expression, origin: &Expression) -> bool {
    index_key_schemas(proposed) != index_key_schemas(origin)
}
